use crate::error::{BinaryError, Result};
use crate::reader::Reader;

const HEADER_TINY: u8 = 0x2;
const HEADER_FAT: u8 = 0x3;

/// Operand footprint of one opcode; only token operands are of interest,
/// but every shape must be stepped over correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    None,
    Byte,
    Word,
    DWord,
    QWord,
    Token,
    Switch,
}

/// Walk one method body and collect every inline metadata token the code
/// touches (calls, field accesses, object creation, type tokens).
///
/// `body` starts at the method header. Unknown opcodes fail the whole
/// method, which the caller escalates to a malformed artifact.
pub fn method_tokens(body: &[u8]) -> Result<Vec<u32>> {
    let mut reader = Reader::new(body);
    let first = reader.u8()?;

    let code_size = match first & 0x3 {
        HEADER_TINY => usize::from(first >> 2),
        HEADER_FAT => {
            // Fat header: 12 bits of flags, 4 bits of header size in dwords.
            let more = reader.u8()?;
            let header_dwords = usize::from(more >> 4);
            reader.u16()?; // max stack
            let code_size = reader.u32()? as usize;
            // Skip the rest of the header (local var signature et al).
            let consumed = 8;
            let header_bytes = header_dwords * 4;
            if header_bytes < consumed {
                return Err(BinaryError::invalid("fat method header too small"));
            }
            reader.skip(header_bytes - consumed)?;
            code_size
        }
        _ => {
            return Err(BinaryError::invalid(format!(
                "unrecognized method header byte 0x{first:02X}"
            )))
        }
    };

    let code = reader.bytes(code_size)?;
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < code.len() {
        let op = code[pos];
        pos += 1;

        let operand = if op == 0xFE {
            let ext = *code
                .get(pos)
                .ok_or(BinaryError::Truncated(pos))?;
            pos += 1;
            extended_operand(ext).ok_or(BinaryError::UnknownOpcode {
                opcode: 0xFE00 | u16::from(ext),
                offset: pos - 2,
            })?
        } else {
            single_operand(op).ok_or(BinaryError::UnknownOpcode {
                opcode: u16::from(op),
                offset: pos - 1,
            })?
        };

        match operand {
            Operand::None => {}
            Operand::Byte => pos += 1,
            Operand::Word => pos += 2,
            Operand::DWord => pos += 4,
            Operand::QWord => pos += 8,
            Operand::Token => {
                let bytes = code
                    .get(pos..pos + 4)
                    .ok_or(BinaryError::Truncated(pos))?;
                tokens.push(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
                pos += 4;
            }
            Operand::Switch => {
                let bytes = code
                    .get(pos..pos + 4)
                    .ok_or(BinaryError::Truncated(pos))?;
                let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
                pos += 4 + count * 4;
            }
        }
        if pos > code.len() {
            return Err(BinaryError::Truncated(pos));
        }
    }

    Ok(tokens)
}

/// Operand shapes of the single-byte opcode page (ECMA-335 III).
fn single_operand(op: u8) -> Option<Operand> {
    use Operand::*;
    Some(match op {
        // ldarg.0-3, ldloc.0-3, stloc.0-3, nop, break, ldnull, ldc.i4.m1-8,
        // dup, pop, ret, loads/stores/arithmetic/conversions
        0x00..=0x0D | 0x14..=0x1E | 0x25 | 0x26 | 0x2A => None,
        0x46..=0x57 | 0x58..=0x66 | 0x67..=0x6E | 0x76 | 0x7A => None,
        0x82..=0x8B | 0x8E | 0x90..=0xA2 | 0xB3..=0xBA | 0xC3 => None,
        0xD1..=0xDC | 0xDF | 0xE0 => None,

        // short-form locals/args and small constants
        0x0E..=0x13 | 0x1F => Byte,
        // short branches, leave.s
        0x2B..=0x37 | 0xDE => Byte,
        // ldc.i4, long branches, leave
        0x20 | 0x38..=0x44 | 0xDD => DWord,
        // ldc.i8, ldc.r8
        0x21 | 0x23 => QWord,
        // ldc.r4
        0x22 => DWord,
        0x45 => Switch,

        // jmp, call, calli, callvirt, cpobj, ldobj, ldstr, newobj,
        // castclass, isinst, unbox, field group, stobj, box, newarr,
        // ldelema, ldelem, stelem, unbox.any, refanyval, mkrefany, ldtoken
        0x27 | 0x28 | 0x29 | 0x6F | 0x70 | 0x71 | 0x72 | 0x73 | 0x74 | 0x75 | 0x79 => Token,
        0x7B..=0x81 | 0x8C | 0x8D | 0x8F | 0xA3 | 0xA4 | 0xA5 | 0xC2 | 0xC6 | 0xD0 => Token,

        _ => return Option::None,
    })
}

/// Operand shapes of the 0xFE extended page.
fn extended_operand(op: u8) -> Option<Operand> {
    use Operand::*;
    Some(match op {
        // arglist, ceq, cgt, cgt.un, clt, clt.un, localloc, endfilter,
        // volatile., tail., cpblk, initblk, rethrow, refanytype, readonly.
        0x00..=0x05 | 0x0F | 0x11 | 0x13 | 0x14 | 0x17 | 0x18 | 0x1A | 0x1D | 0x1E => None,
        // ldarg, ldarga, starg, ldloc, ldloca, stloc (wide forms)
        0x09..=0x0E => Word,
        // unaligned., no.
        0x12 | 0x19 => Byte,
        // ldftn, ldvirtftn, initobj, constrained., sizeof
        0x06 | 0x07 | 0x15 | 0x16 | 0x1C => Token,
        _ => return Option::None,
    })
}

/// Strip the heap/table tag: true when the token indexes a metadata table
/// the link resolver understands.
#[must_use]
pub const fn is_resolvable_table(token: u32) -> bool {
    let table = (token >> 24) as u8;
    matches!(
        table,
        crate::metadata::TABLE_TYPE_REF
            | crate::metadata::TABLE_TYPE_DEF
            | crate::metadata::TABLE_FIELD
            | crate::metadata::TABLE_METHOD_DEF
            | crate::metadata::TABLE_MEMBER_REF
            | crate::metadata::TABLE_METHOD_SPEC
    )
}
