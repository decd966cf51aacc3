use crate::error::{BinaryError, Result};
use crate::pe::PeFile;
use crate::reader::{compressed_u32, Reader};

const METADATA_SIGNATURE: u32 = 0x424A_5342; // "BSJB"

// Table ids (ECMA-335 II.22).
pub const TABLE_MODULE: u8 = 0x00;
pub const TABLE_TYPE_REF: u8 = 0x01;
pub const TABLE_TYPE_DEF: u8 = 0x02;
pub const TABLE_FIELD: u8 = 0x04;
pub const TABLE_METHOD_DEF: u8 = 0x06;
pub const TABLE_PARAM: u8 = 0x08;
pub const TABLE_INTERFACE_IMPL: u8 = 0x09;
pub const TABLE_MEMBER_REF: u8 = 0x0A;
pub const TABLE_EVENT_MAP: u8 = 0x12;
pub const TABLE_EVENT: u8 = 0x14;
pub const TABLE_PROPERTY_MAP: u8 = 0x15;
pub const TABLE_PROPERTY: u8 = 0x17;
pub const TABLE_METHOD_SEMANTICS: u8 = 0x18;
pub const TABLE_MODULE_REF: u8 = 0x1A;
pub const TABLE_TYPE_SPEC: u8 = 0x1B;
pub const TABLE_ASSEMBLY: u8 = 0x20;
pub const TABLE_ASSEMBLY_REF: u8 = 0x23;
pub const TABLE_NESTED_CLASS: u8 = 0x29;
pub const TABLE_GENERIC_PARAM: u8 = 0x2A;
pub const TABLE_METHOD_SPEC: u8 = 0x2B;
pub const TABLE_GENERIC_PARAM_CONSTRAINT: u8 = 0x2C;

const TABLE_COUNT: usize = 64;

/// Column shapes a physical row can be built from. Sizes depend on heap
/// flags and row counts, so layouts are declarative and sized at load time.
#[derive(Clone, Copy)]
enum Col {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Idx(u8),
    Coded(Coded),
}

/// Coded-index families (ECMA-335 II.24.2.6): a tag in the low bits selects
/// the table, the rest is the row index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    const fn tag_bits(self) -> u32 {
        match self {
            Coded::HasFieldMarshal
            | Coded::HasSemantics
            | Coded::MethodDefOrRef
            | Coded::MemberForwarded
            | Coded::TypeOrMethodDef => 1,
            Coded::TypeDefOrRef
            | Coded::HasConstant
            | Coded::HasDeclSecurity
            | Coded::Implementation
            | Coded::ResolutionScope => 2,
            Coded::MemberRefParent | Coded::CustomAttributeType => 3,
            Coded::HasCustomAttribute => 5,
        }
    }

    fn tables(self) -> &'static [u8] {
        match self {
            Coded::TypeDefOrRef => &[TABLE_TYPE_DEF, TABLE_TYPE_REF, TABLE_TYPE_SPEC],
            Coded::HasConstant => &[TABLE_FIELD, TABLE_PARAM, TABLE_PROPERTY],
            Coded::HasCustomAttribute => &[
                TABLE_METHOD_DEF,
                TABLE_FIELD,
                TABLE_TYPE_REF,
                TABLE_TYPE_DEF,
                TABLE_PARAM,
                TABLE_INTERFACE_IMPL,
                TABLE_MEMBER_REF,
                TABLE_MODULE,
                0x0E,
                TABLE_PROPERTY,
                TABLE_EVENT,
                0x11,
                TABLE_MODULE_REF,
                TABLE_TYPE_SPEC,
                TABLE_ASSEMBLY,
                TABLE_ASSEMBLY_REF,
                0x26,
                0x27,
                0x28,
                TABLE_GENERIC_PARAM,
                TABLE_GENERIC_PARAM_CONSTRAINT,
                TABLE_METHOD_SPEC,
            ],
            Coded::HasFieldMarshal => &[TABLE_FIELD, TABLE_PARAM],
            Coded::HasDeclSecurity => &[TABLE_TYPE_DEF, TABLE_METHOD_DEF, TABLE_ASSEMBLY],
            Coded::MemberRefParent => &[
                TABLE_TYPE_DEF,
                TABLE_TYPE_REF,
                TABLE_MODULE_REF,
                TABLE_METHOD_DEF,
                TABLE_TYPE_SPEC,
            ],
            Coded::HasSemantics => &[TABLE_EVENT, TABLE_PROPERTY],
            Coded::MethodDefOrRef => &[TABLE_METHOD_DEF, TABLE_MEMBER_REF],
            Coded::MemberForwarded => &[TABLE_FIELD, TABLE_METHOD_DEF],
            Coded::Implementation => &[0x26, TABLE_ASSEMBLY_REF, 0x27],
            Coded::CustomAttributeType => &[TABLE_METHOD_DEF, TABLE_MEMBER_REF],
            Coded::ResolutionScope => &[
                TABLE_MODULE,
                TABLE_MODULE_REF,
                TABLE_ASSEMBLY_REF,
                TABLE_TYPE_REF,
            ],
            Coded::TypeOrMethodDef => &[TABLE_TYPE_DEF, TABLE_METHOD_DEF],
        }
    }
}

/// A decoded coded index: which table, which 1-based row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodedIndex {
    pub table: u8,
    pub row: u32,
}

fn row_layout(table: u8) -> Option<&'static [Col]> {
    use Col::*;
    Some(match table {
        0x00 => &[U16, Str, Guid, Guid, Guid],
        0x01 => &[Coded(self::Coded::ResolutionScope), Str, Str],
        0x02 => &[
            U32,
            Str,
            Str,
            Coded(self::Coded::TypeDefOrRef),
            Idx(TABLE_FIELD),
            Idx(TABLE_METHOD_DEF),
        ],
        0x03 => &[Idx(TABLE_FIELD)],
        0x04 => &[U16, Str, Blob],
        0x05 => &[Idx(TABLE_METHOD_DEF)],
        0x06 => &[U32, U16, U16, Str, Blob, Idx(TABLE_PARAM)],
        0x07 => &[Idx(TABLE_PARAM)],
        0x08 => &[U16, U16, Str],
        0x09 => &[Idx(TABLE_TYPE_DEF), Coded(self::Coded::TypeDefOrRef)],
        0x0A => &[Coded(self::Coded::MemberRefParent), Str, Blob],
        0x0B => &[U16, Coded(self::Coded::HasConstant), Blob],
        0x0C => &[
            Coded(self::Coded::HasCustomAttribute),
            Coded(self::Coded::CustomAttributeType),
            Blob,
        ],
        0x0D => &[Coded(self::Coded::HasFieldMarshal), Blob],
        0x0E => &[U16, Coded(self::Coded::HasDeclSecurity), Blob],
        0x0F => &[U16, U32, Idx(TABLE_TYPE_DEF)],
        0x10 => &[U32, Idx(TABLE_FIELD)],
        0x11 => &[Blob],
        0x12 => &[Idx(TABLE_TYPE_DEF), Idx(TABLE_EVENT)],
        0x13 => &[Idx(TABLE_EVENT)],
        0x14 => &[U16, Str, Coded(self::Coded::TypeDefOrRef)],
        0x15 => &[Idx(TABLE_TYPE_DEF), Idx(TABLE_PROPERTY)],
        0x16 => &[Idx(TABLE_PROPERTY)],
        0x17 => &[U16, Str, Blob],
        0x18 => &[U16, Idx(TABLE_METHOD_DEF), Coded(self::Coded::HasSemantics)],
        0x19 => &[
            Idx(TABLE_TYPE_DEF),
            Coded(self::Coded::MethodDefOrRef),
            Coded(self::Coded::MethodDefOrRef),
        ],
        0x1A => &[Str],
        0x1B => &[Blob],
        0x1C => &[U16, Coded(self::Coded::MemberForwarded), Str, Idx(TABLE_MODULE_REF)],
        0x1D => &[U32, Idx(TABLE_FIELD)],
        0x1E => &[U32, U32],
        0x1F => &[U32],
        0x20 => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        0x21 => &[U32],
        0x22 => &[U32, U32, U32],
        0x23 => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        0x24 => &[U32, Idx(TABLE_ASSEMBLY_REF)],
        0x25 => &[U32, U32, U32, Idx(TABLE_ASSEMBLY_REF)],
        0x26 => &[U32, Str, Blob],
        0x27 => &[U32, U32, Str, Str, Coded(self::Coded::Implementation)],
        0x28 => &[U32, U32, Str, Coded(self::Coded::Implementation)],
        0x29 => &[Idx(TABLE_TYPE_DEF), Idx(TABLE_TYPE_DEF)],
        0x2A => &[U16, U16, Coded(self::Coded::TypeOrMethodDef), Str],
        0x2B => &[Coded(self::Coded::MethodDefOrRef), Blob],
        0x2C => &[Idx(TABLE_GENERIC_PARAM), Coded(self::Coded::TypeDefOrRef)],
        _ => return None,
    })
}

/// Index widths for the module being read.
pub struct Sizes {
    wide_str: bool,
    wide_guid: bool,
    wide_blob: bool,
    counts: [u32; TABLE_COUNT],
}

impl Sizes {
    #[must_use]
    pub fn new(heap_sizes: u8, counts: [u32; TABLE_COUNT]) -> Self {
        Self {
            wide_str: heap_sizes & 0x01 != 0,
            wide_guid: heap_sizes & 0x02 != 0,
            wide_blob: heap_sizes & 0x04 != 0,
            counts,
        }
    }

    #[must_use]
    pub fn row_count(&self, table: u8) -> u32 {
        self.counts[table as usize]
    }

    fn wide_index(&self, table: u8) -> bool {
        self.row_count(table) > 0xFFFF
    }

    fn wide_coded(&self, coded: Coded) -> bool {
        let limit = 1u32 << (16 - coded.tag_bits());
        coded
            .tables()
            .iter()
            .any(|&table| self.row_count(table) >= limit)
    }

    fn col_size(&self, col: Col) -> usize {
        match col {
            Col::U16 => 2,
            Col::U32 => 4,
            Col::Str => {
                if self.wide_str {
                    4
                } else {
                    2
                }
            }
            Col::Guid => {
                if self.wide_guid {
                    4
                } else {
                    2
                }
            }
            Col::Blob => {
                if self.wide_blob {
                    4
                } else {
                    2
                }
            }
            Col::Idx(table) => {
                if self.wide_index(table) {
                    4
                } else {
                    2
                }
            }
            Col::Coded(coded) => {
                if self.wide_coded(coded) {
                    4
                } else {
                    2
                }
            }
        }
    }

    fn row_size(&self, table: u8) -> Result<usize> {
        let layout = row_layout(table).ok_or_else(|| {
            BinaryError::invalid(format!("unknown metadata table 0x{table:02X}"))
        })?;
        Ok(layout.iter().map(|&col| self.col_size(col)).sum())
    }
}

/// Row cursor bound to the module's index widths.
struct RowReader<'a, 'b> {
    reader: Reader<'a>,
    sizes: &'b Sizes,
}

impl<'a> RowReader<'a, '_> {
    fn u16(&mut self) -> Result<u16> {
        self.reader.u16()
    }

    fn u32(&mut self) -> Result<u32> {
        self.reader.u32()
    }

    fn str_index(&mut self) -> Result<u32> {
        self.reader.index(self.sizes.wide_str)
    }

    fn blob_index(&mut self) -> Result<u32> {
        self.reader.index(self.sizes.wide_blob)
    }

    fn table_index(&mut self, table: u8) -> Result<u32> {
        self.reader.index(self.sizes.wide_index(table))
    }

    fn coded_index(&mut self, coded: Coded) -> Result<CodedIndex> {
        let raw = self.reader.index(self.sizes.wide_coded(coded))?;
        let tag_bits = coded.tag_bits();
        let tag = (raw & ((1 << tag_bits) - 1)) as usize;
        let row = raw >> tag_bits;
        let table = coded
            .tables()
            .get(tag)
            .copied()
            .ok_or_else(|| BinaryError::invalid(format!("bad {coded:?} tag {tag}")))?;
        Ok(CodedIndex { table, row })
    }
}

#[derive(Debug, Clone)]
pub struct TypeRefRow {
    pub scope: CodedIndex,
    pub name: u32,
    pub namespace: u32,
}

#[derive(Debug, Clone)]
pub struct TypeDefRow {
    pub flags: u32,
    pub name: u32,
    pub namespace: u32,
    pub extends: CodedIndex,
    pub field_start: u32,
    pub method_start: u32,
}

#[derive(Debug, Clone)]
pub struct FieldRow {
    pub flags: u16,
    pub name: u32,
}

#[derive(Debug, Clone)]
pub struct MethodRow {
    pub rva: u32,
    pub flags: u16,
    pub name: u32,
}

#[derive(Debug, Clone)]
pub struct InterfaceImplRow {
    pub class: u32,
    pub interface: CodedIndex,
}

#[derive(Debug, Clone)]
pub struct MemberRefRow {
    pub parent: CodedIndex,
    pub name: u32,
    pub signature: u32,
}

#[derive(Debug, Clone)]
pub struct MapRow {
    pub parent: u32,
    pub list_start: u32,
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub name: u32,
}

#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub name: u32,
}

#[derive(Debug, Clone)]
pub struct MethodSemanticsRow {
    pub semantics: u16,
    pub method: u32,
    pub association: CodedIndex,
}

/// The decoded slice of metadata this parser consumes, plus the heaps.
pub struct Metadata {
    strings: Vec<u8>,
    blobs: Vec<u8>,
    pub sizes: Sizes,
    pub module_name: u32,
    pub assembly_name: Option<u32>,
    pub type_refs: Vec<TypeRefRow>,
    pub type_defs: Vec<TypeDefRow>,
    pub fields: Vec<FieldRow>,
    pub methods: Vec<MethodRow>,
    pub interface_impls: Vec<InterfaceImplRow>,
    pub member_refs: Vec<MemberRefRow>,
    pub event_maps: Vec<MapRow>,
    pub events: Vec<EventRow>,
    pub property_maps: Vec<MapRow>,
    pub properties: Vec<PropertyRow>,
    pub method_semantics: Vec<MethodSemanticsRow>,
    pub module_refs: Vec<u32>,
    pub assembly_refs: Vec<u32>,
    /// (nested TypeDef row, enclosing TypeDef row), 1-based.
    pub nested_classes: Vec<(u32, u32)>,
    /// Generic method instantiations: the MethodDefOrRef they instantiate.
    pub method_specs: Vec<CodedIndex>,
}

impl Metadata {
    /// Locate and decode the metadata inside a parsed PE image.
    pub fn parse(pe: &PeFile) -> Result<Self> {
        let mut cli = pe.reader_at_rva(pe.cli_rva())?;
        let _cb = cli.u32()?;
        cli.skip(4)?; // runtime version
        let metadata_rva = cli.u32()?;
        let _metadata_size = cli.u32()?;

        let root_offset = pe.rva_to_offset(metadata_rva)?;
        let mut root = Reader::at(pe.data(), root_offset)?;
        if root.u32()? != METADATA_SIGNATURE {
            return Err(BinaryError::invalid("missing BSJB metadata signature"));
        }
        root.skip(8)?; // version numbers, reserved
        let version_len = root.u32()? as usize;
        root.skip(version_len)?;
        root.skip(2)?; // flags
        let stream_count = root.u16()?;

        let mut tables_stream: Option<(usize, usize)> = None;
        let mut strings = Vec::new();
        let mut blobs = Vec::new();
        for _ in 0..stream_count {
            let offset = root.u32()? as usize;
            let size = root.u32()? as usize;
            let name = read_stream_name(&mut root)?;
            let start = root_offset + offset;
            match name.as_str() {
                "#~" => tables_stream = Some((start, size)),
                "#-" => {
                    return Err(BinaryError::invalid(
                        "uncompressed (#-) metadata streams are not supported",
                    ))
                }
                "#Strings" => {
                    strings = slice_checked(pe.data(), start, size)?.to_vec();
                }
                "#Blob" => {
                    blobs = slice_checked(pe.data(), start, size)?.to_vec();
                }
                _ => {}
            }
        }

        let (tables_start, tables_size) =
            tables_stream.ok_or_else(|| BinaryError::invalid("missing #~ tables stream"))?;
        let tables_data = slice_checked(pe.data(), tables_start, tables_size)?;
        Self::parse_tables(tables_data, strings, blobs)
    }

    fn parse_tables(data: &[u8], strings: Vec<u8>, blobs: Vec<u8>) -> Result<Self> {
        let mut reader = Reader::new(data);
        reader.skip(4)?; // reserved
        reader.skip(2)?; // major/minor version
        let heap_sizes = reader.u8()?;
        reader.skip(1)?; // reserved
        let valid = reader.u64()?;
        let _sorted = reader.u64()?;

        let mut counts = [0u32; TABLE_COUNT];
        for (table, count) in counts.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = reader.u32()?;
            }
        }
        let sizes = Sizes::new(heap_sizes, counts);

        let mut module_name = 0;
        let mut assembly_name = None;
        let mut type_refs = Vec::new();
        let mut type_defs = Vec::new();
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut interface_impls = Vec::new();
        let mut member_refs = Vec::new();
        let mut event_maps = Vec::new();
        let mut events = Vec::new();
        let mut property_maps = Vec::new();
        let mut properties = Vec::new();
        let mut method_semantics = Vec::new();
        let mut module_refs = Vec::new();
        let mut assembly_refs = Vec::new();
        let mut nested_classes = Vec::new();
        let mut method_specs = Vec::new();

        for table in 0..TABLE_COUNT as u8 {
            let rows = sizes.row_count(table);
            if rows == 0 {
                continue;
            }
            let row_size = sizes.row_size(table)?;

            match table {
                TABLE_MODULE => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        row.u16()?;
                        let name = row.str_index()?;
                        if i == 0 {
                            module_name = name;
                        }
                    }
                }
                TABLE_TYPE_REF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        type_refs.push(TypeRefRow {
                            scope: row.coded_index(Coded::ResolutionScope)?,
                            name: row.str_index()?,
                            namespace: row.str_index()?,
                        });
                    }
                }
                TABLE_TYPE_DEF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        type_defs.push(TypeDefRow {
                            flags: row.u32()?,
                            name: row.str_index()?,
                            namespace: row.str_index()?,
                            extends: row.coded_index(Coded::TypeDefOrRef)?,
                            field_start: row.table_index(TABLE_FIELD)?,
                            method_start: row.table_index(TABLE_METHOD_DEF)?,
                        });
                    }
                }
                TABLE_FIELD => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        fields.push(FieldRow {
                            flags: row.u16()?,
                            name: row.str_index()?,
                        });
                    }
                }
                TABLE_METHOD_DEF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        let rva = row.u32()?;
                        row.u16()?; // impl flags
                        let flags = row.u16()?;
                        let name = row.str_index()?;
                        methods.push(MethodRow { rva, flags, name });
                    }
                }
                TABLE_INTERFACE_IMPL => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        interface_impls.push(InterfaceImplRow {
                            class: row.table_index(TABLE_TYPE_DEF)?,
                            interface: row.coded_index(Coded::TypeDefOrRef)?,
                        });
                    }
                }
                TABLE_MEMBER_REF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        member_refs.push(MemberRefRow {
                            parent: row.coded_index(Coded::MemberRefParent)?,
                            name: row.str_index()?,
                            signature: row.blob_index()?,
                        });
                    }
                }
                TABLE_EVENT_MAP => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        event_maps.push(MapRow {
                            parent: row.table_index(TABLE_TYPE_DEF)?,
                            list_start: row.table_index(TABLE_EVENT)?,
                        });
                    }
                }
                TABLE_EVENT => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        row.u16()?; // flags
                        events.push(EventRow {
                            name: row.str_index()?,
                        });
                    }
                }
                TABLE_PROPERTY_MAP => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        property_maps.push(MapRow {
                            parent: row.table_index(TABLE_TYPE_DEF)?,
                            list_start: row.table_index(TABLE_PROPERTY)?,
                        });
                    }
                }
                TABLE_PROPERTY => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        row.u16()?; // flags
                        properties.push(PropertyRow {
                            name: row.str_index()?,
                        });
                    }
                }
                TABLE_METHOD_SEMANTICS => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        method_semantics.push(MethodSemanticsRow {
                            semantics: row.u16()?,
                            method: row.table_index(TABLE_METHOD_DEF)?,
                            association: row.coded_index(Coded::HasSemantics)?,
                        });
                    }
                }
                TABLE_MODULE_REF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        module_refs.push(row.str_index()?);
                    }
                }
                TABLE_ASSEMBLY => {
                    let mut row = RowReader {
                        reader: Reader::at(data, reader.pos())?,
                        sizes: &sizes,
                    };
                    row.u32()?; // hash algorithm
                    row.u16()?;
                    row.u16()?;
                    row.u16()?;
                    row.u16()?;
                    row.u32()?; // flags
                    row.blob_index()?; // public key
                    assembly_name = Some(row.str_index()?);
                }
                TABLE_ASSEMBLY_REF => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        row.u16()?;
                        row.u16()?;
                        row.u16()?;
                        row.u16()?;
                        row.u32()?; // flags
                        row.blob_index()?; // public key or token
                        assembly_refs.push(row.str_index()?);
                    }
                }
                TABLE_NESTED_CLASS => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        let nested = row.table_index(TABLE_TYPE_DEF)?;
                        let enclosing = row.table_index(TABLE_TYPE_DEF)?;
                        nested_classes.push((nested, enclosing));
                    }
                }
                TABLE_METHOD_SPEC => {
                    for i in 0..rows {
                        let mut row = RowReader {
                            reader: Reader::at(data, reader.pos() + i as usize * row_size)?,
                            sizes: &sizes,
                        };
                        method_specs.push(row.coded_index(Coded::MethodDefOrRef)?);
                    }
                }
                _ => {}
            }

            reader.skip(rows as usize * row_size)?;
        }

        Ok(Self {
            strings,
            blobs,
            sizes,
            module_name,
            assembly_name,
            type_refs,
            type_defs,
            fields,
            methods,
            interface_impls,
            member_refs,
            event_maps,
            events,
            property_maps,
            properties,
            method_semantics,
            module_refs,
            assembly_refs,
            nested_classes,
            method_specs,
        })
    }

    /// Empty metadata over explicit heaps; rows are pushed directly by
    /// emitter tests.
    #[cfg(test)]
    pub(crate) fn for_tests(strings: Vec<u8>, blobs: Vec<u8>) -> Self {
        Self {
            strings,
            blobs,
            sizes: Sizes::new(0, [0; TABLE_COUNT]),
            module_name: 0,
            assembly_name: None,
            type_refs: Vec::new(),
            type_defs: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            interface_impls: Vec::new(),
            member_refs: Vec::new(),
            event_maps: Vec::new(),
            events: Vec::new(),
            property_maps: Vec::new(),
            properties: Vec::new(),
            method_semantics: Vec::new(),
            module_refs: Vec::new(),
            assembly_refs: Vec::new(),
            nested_classes: Vec::new(),
            method_specs: Vec::new(),
        }
    }

    /// Null-terminated UTF-8 string from the #Strings heap.
    #[must_use]
    pub fn string_at(&self, index: u32) -> &str {
        let start = index as usize;
        if start >= self.strings.len() {
            return "";
        }
        let tail = &self.strings[start..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).unwrap_or("")
    }

    /// Length-prefixed blob from the #Blob heap.
    #[must_use]
    pub fn blob_at(&self, index: u32) -> Option<&[u8]> {
        let mut reader = Reader::at(&self.blobs, index as usize).ok()?;
        let len = compressed_u32(&mut reader).ok()? as usize;
        reader.bytes(len).ok()
    }
}

fn read_stream_name(reader: &mut Reader<'_>) -> Result<String> {
    let mut name = Vec::new();
    loop {
        let byte = reader.u8()?;
        if byte == 0 {
            break;
        }
        name.push(byte);
        if name.len() > 32 {
            return Err(BinaryError::invalid("unterminated stream name"));
        }
    }
    // Names are padded with nulls to a 4-byte boundary, terminator included.
    let consumed = name.len() + 1;
    let padding = (4 - consumed % 4) % 4;
    reader.skip(padding)?;
    Ok(String::from_utf8_lossy(&name).into_owned())
}

fn slice_checked(data: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(BinaryError::Truncated(start))?;
    Ok(&data[start..end])
}
