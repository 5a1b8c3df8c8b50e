//! Import directory resolution (spec.md §4.9 step 5): for each imported
//! DLL, for each imported symbol, ask the host-supplied resolver for a
//! pointer and write it into the IAT slot.

use crate::error::PeError;
use crate::header::{Bitness, NtHeaders, IMAGE_DIRECTORY_ENTRY_IMPORT};

/// An imported symbol, named or by ordinal (spec.md §4.9 step 5).
#[derive(Debug, Clone)]
pub enum ImportSymbol {
    Name(String),
    Ordinal(u16),
}

impl std::fmt::Display for ImportSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportSymbol::Name(n) => write!(f, "{n}"),
            ImportSymbol::Ordinal(o) => write!(f, "#{o}"),
        }
    }
}

/// Looks up `(dll, symbol)` in the stub registry, returning the address
/// to write into the IAT slot. Implemented by `wcl-win32` over its own
/// kernel32/user32/... export tables (spec.md §4.9 step 5, §4.10).
pub trait ImportResolver {
    fn resolve(&self, dll: &str, symbol: &ImportSymbol) -> Option<usize>;
}

/// If `true`, an unresolved import is logged and left as a null pointer
/// instead of aborting the load (spec.md §4.9 step 5's "unless opted
/// out").
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub tolerate_unresolved: bool,
}

struct Thunk {
    ordinal_flag_bit: u32,
    entry_size: usize,
}

fn thunk_layout(bitness: Bitness) -> Thunk {
    match bitness {
        Bitness::Pe32 => Thunk { ordinal_flag_bit: 31, entry_size: 4 },
        Bitness::Pe32Plus => Thunk { ordinal_flag_bit: 63, entry_size: 8 },
    }
}

fn read_thunk(mem: &[u8], off: usize, size: usize) -> Option<u64> {
    let slice = mem.get(off..off + size)?;
    Some(if size == 4 {
        u32::from_le_bytes(slice.try_into().unwrap()) as u64
    } else {
        u64::from_le_bytes(slice.try_into().unwrap())
    })
}

fn write_thunk(mem: &mut [u8], off: usize, size: usize, value: u64) -> Option<()> {
    let slot = mem.get_mut(off..off + size)?;
    if size == 4 {
        slot.copy_from_slice(&(value as u32).to_le_bytes());
    } else {
        slot.copy_from_slice(&value.to_le_bytes());
    }
    Some(())
}

fn read_c_str(mem: &[u8], off: usize) -> Option<String> {
    let end = mem[off..].iter().position(|&b| b == 0)? + off;
    Some(String::from_utf8_lossy(&mem[off..end]).into_owned())
}

/// Resolves every imported DLL/symbol pair and patches the IAT in place
/// (spec.md §4.9 step 5).
pub fn resolve_imports(
    mem: &mut [u8],
    nt: &NtHeaders,
    resolver: &dyn ImportResolver,
    opts: ImportOptions,
) -> Result<(), PeError> {
    let dir = nt.optional_header.directory(IMAGE_DIRECTORY_ENTRY_IMPORT);
    if dir.size == 0 {
        return Ok(());
    }
    let layout = thunk_layout(nt.optional_header.bitness);
    let ordinal_flag: u64 = 1 << layout.ordinal_flag_bit;

    let mut desc_off = dir.virtual_address as usize;
    let mut descriptor_index = 0;
    loop {
        let fields = mem
            .get(desc_off..desc_off + 20)
            .ok_or(PeError::MalformedImport(descriptor_index))?;
        let original_first_thunk = u32::from_le_bytes(fields[0..4].try_into().unwrap());
        let name_rva = u32::from_le_bytes(fields[12..16].try_into().unwrap());
        let first_thunk = u32::from_le_bytes(fields[16..20].try_into().unwrap());
        if original_first_thunk == 0 && name_rva == 0 && first_thunk == 0 {
            break;
        }

        let dll_name = read_c_str(mem, name_rva as usize).ok_or(PeError::MalformedImport(descriptor_index))?;
        let int_rva = if original_first_thunk != 0 { original_first_thunk } else { first_thunk };

        let mut i = 0usize;
        loop {
            let int_off = int_rva as usize + i * layout.entry_size;
            let iat_off = first_thunk as usize + i * layout.entry_size;
            let raw = read_thunk(mem, int_off, layout.entry_size).ok_or(PeError::MalformedImport(descriptor_index))?;
            if raw == 0 {
                break;
            }
            let symbol = if raw & ordinal_flag != 0 {
                ImportSymbol::Ordinal((raw & 0xFFFF) as u16)
            } else {
                let hint_name_off = (raw as usize) & 0x7FFF_FFFF;
                let name = read_c_str(mem, hint_name_off + 2).ok_or(PeError::MalformedImport(descriptor_index))?;
                ImportSymbol::Name(name)
            };

            match resolver.resolve(&dll_name, &symbol) {
                Some(addr) => {
                    write_thunk(mem, iat_off, layout.entry_size, addr as u64)
                        .ok_or(PeError::MalformedImport(descriptor_index))?;
                }
                None => {
                    if opts.tolerate_unresolved {
                        log::warn!("unresolved import {dll_name}!{symbol}, leaving null");
                        write_thunk(mem, iat_off, layout.entry_size, 0);
                    } else {
                        return Err(PeError::UnresolvedImport { dll: dll_name, symbol: symbol.to_string() });
                    }
                }
            }
            i += 1;
        }

        desc_off += 20;
        descriptor_index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Bitness, DataDirectory, FileHeader, OptionalHeader};

    struct StubResolver;
    impl ImportResolver for StubResolver {
        fn resolve(&self, dll: &str, symbol: &ImportSymbol) -> Option<usize> {
            match (dll, symbol) {
                ("KERNEL32.dll", ImportSymbol::Name(n)) if n == "ExitProcess" => Some(0xDEAD_BEEF),
                _ => None,
            }
        }
    }

    fn nt_with_import_dir(va: u32, size: u32) -> NtHeaders {
        let mut dirs = [DataDirectory::default(); 16];
        dirs[IMAGE_DIRECTORY_ENTRY_IMPORT] = DataDirectory { virtual_address: va, size };
        NtHeaders {
            file_header: FileHeader { machine: 0x8664, number_of_sections: 0, size_of_optional_header: 0, characteristics: 0 },
            optional_header: OptionalHeader {
                magic: 0x20B,
                bitness: Bitness::Pe32Plus,
                address_of_entry_point: 0,
                image_base: 0,
                section_alignment: 0x1000,
                file_alignment: 0x200,
                size_of_image: 0,
                size_of_headers: 0,
                data_directories: dirs,
            },
            sections: Vec::new(),
        }
    }

    #[test]
    fn resolves_named_import_into_iat() {
        let mut mem = vec![0u8; 0x400];
        // Layout: descriptor at 0, name "KERNEL32.dll" at 0x100,
        // INT at 0x140 (one 8-byte thunk + terminator), hint/name at
        // 0x160, IAT at 0x180.
        let dll_name_rva = 0x100u32;
        mem[dll_name_rva as usize..dll_name_rva as usize + 12].copy_from_slice(b"KERNEL32.dll");

        let hint_name_rva = 0x160u32;
        mem[hint_name_rva as usize + 2..hint_name_rva as usize + 2 + 11].copy_from_slice(b"ExitProcess");

        let int_rva = 0x140u32;
        mem[int_rva as usize..int_rva as usize + 8].copy_from_slice(&(hint_name_rva as u64).to_le_bytes());

        let iat_rva = 0x180u32;

        // IMAGE_IMPORT_DESCRIPTOR
        mem[0..4].copy_from_slice(&int_rva.to_le_bytes());
        mem[12..16].copy_from_slice(&dll_name_rva.to_le_bytes());
        mem[16..20].copy_from_slice(&iat_rva.to_le_bytes());
        // terminator descriptor
        // (rest of mem is already zeroed)

        let nt = nt_with_import_dir(0, 20);
        let resolver = StubResolver;
        resolve_imports(&mut mem, &nt, &resolver, ImportOptions::default()).unwrap();

        let patched = u64::from_le_bytes(mem[iat_rva as usize..iat_rva as usize + 8].try_into().unwrap());
        assert_eq!(patched, 0xDEAD_BEEF);
    }

    #[test]
    fn unresolved_import_is_fatal_unless_opted_out() {
        let mut mem = vec![0u8; 0x400];
        let dll_name_rva = 0x100u32;
        mem[dll_name_rva as usize..dll_name_rva as usize + 4].copy_from_slice(b"XYZ\0");
        let hint_name_rva = 0x160u32;
        mem[hint_name_rva as usize + 2..hint_name_rva as usize + 2 + 6].copy_from_slice(b"Thing\0");
        let int_rva = 0x140u32;
        mem[int_rva as usize..int_rva as usize + 8].copy_from_slice(&(hint_name_rva as u64).to_le_bytes());
        let iat_rva = 0x180u32;
        mem[0..4].copy_from_slice(&int_rva.to_le_bytes());
        mem[12..16].copy_from_slice(&dll_name_rva.to_le_bytes());
        mem[16..20].copy_from_slice(&iat_rva.to_le_bytes());

        let nt = nt_with_import_dir(0, 20);
        let resolver = StubResolver;
        assert!(resolve_imports(&mut mem, &nt, &resolver, ImportOptions::default()).is_err());
        assert!(resolve_imports(&mut mem, &nt, &resolver, ImportOptions { tolerate_unresolved: true }).is_ok());
    }
}
