use crate::error::{BinaryError, Result};
use crate::reader::Reader;

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const OPT_MAGIC_PE32: u16 = 0x010B;
const OPT_MAGIC_PE32_PLUS: u16 = 0x020B;
const CLI_HEADER_DIRECTORY: usize = 14;

#[derive(Debug, Clone)]
pub struct Section {
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
}

/// Parsed PE image: enough structure to resolve RVAs and find the CLI
/// runtime header. The raw bytes stay owned here; all downstream readers
/// borrow from it.
pub struct PeFile {
    data: Vec<u8>,
    sections: Vec<Section>,
    cli_rva: u32,
    pub is_executable_image: bool,
}

impl PeFile {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let mut reader = Reader::new(&data);
        if reader.u16()? != DOS_MAGIC {
            return Err(BinaryError::invalid("missing MZ header"));
        }

        let mut lfanew = Reader::at(&data, 0x3C)?;
        let pe_offset = lfanew.u32()? as usize;

        let mut coff = Reader::at(&data, pe_offset)?;
        if coff.u32()? != PE_SIGNATURE {
            return Err(BinaryError::invalid("missing PE signature"));
        }
        let _machine = coff.u16()?;
        let section_count = coff.u16()?;
        coff.skip(12)?; // timestamp, symbol table pointer, symbol count
        let optional_size = coff.u16()?;
        let characteristics = coff.u16()?;
        let is_executable_image = characteristics & 0x0002 != 0;

        let optional_offset = coff.pos();
        let mut optional = Reader::at(&data, optional_offset)?;
        let magic = optional.u16()?;
        let directories_offset = match magic {
            OPT_MAGIC_PE32 => optional_offset + 96,
            OPT_MAGIC_PE32_PLUS => optional_offset + 112,
            other => {
                return Err(BinaryError::invalid(format!(
                    "unknown optional header magic 0x{other:04X}"
                )))
            }
        };

        let directory_count_offset = directories_offset - 4;
        let mut count_reader = Reader::at(&data, directory_count_offset)?;
        let directory_count = count_reader.u32()? as usize;
        if directory_count <= CLI_HEADER_DIRECTORY {
            return Err(BinaryError::invalid("image carries no CLI directory"));
        }

        let mut cli_dir = Reader::at(&data, directories_offset + CLI_HEADER_DIRECTORY * 8)?;
        let cli_rva = cli_dir.u32()?;
        let cli_size = cli_dir.u32()?;
        if cli_rva == 0 || cli_size == 0 {
            return Err(BinaryError::invalid("not a managed module"));
        }

        let mut sections = Vec::with_capacity(section_count as usize);
        let mut section_reader = Reader::at(&data, optional_offset + optional_size as usize)?;
        for _ in 0..section_count {
            section_reader.skip(8)?; // name
            let virtual_size = section_reader.u32()?;
            let virtual_address = section_reader.u32()?;
            let raw_size = section_reader.u32()?;
            let raw_offset = section_reader.u32()?;
            section_reader.skip(16)?; // relocations, line numbers, flags
            sections.push(Section {
                virtual_address,
                virtual_size,
                raw_offset,
                raw_size,
            });
        }

        Ok(Self {
            data,
            sections,
            cli_rva,
            is_executable_image,
        })
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn cli_rva(&self) -> u32 {
        self.cli_rva
    }

    /// Map a virtual address into the file image.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        for section in &self.sections {
            let span = section.virtual_size.max(section.raw_size);
            if rva >= section.virtual_address && rva < section.virtual_address.saturating_add(span)
            {
                let delta = rva - section.virtual_address;
                if delta >= section.raw_size {
                    // Inside virtual padding; nothing on disk to read.
                    return Err(BinaryError::UnmappedRva(rva));
                }
                return Ok(section.raw_offset as usize + delta as usize);
            }
        }
        Err(BinaryError::UnmappedRva(rva))
    }

    pub fn reader_at_rva(&self, rva: u32) -> Result<Reader<'_>> {
        let offset = self.rva_to_offset(rva)?;
        Reader::at(&self.data, offset)
    }

    #[cfg(test)]
    pub(crate) fn fake_for_tests(data: Vec<u8>, sections: Vec<Section>) -> Self {
        Self {
            data,
            sections,
            cli_rva: 0,
            is_executable_image: false,
        }
    }
}
