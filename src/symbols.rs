//! Function symbol resolution for instruction pointers
//!
//! Loads `STT_FUNC` symbols from an ELF binary with the `object` crate and
//! answers "which function contains this address". Position-independent
//! executables are relocated by the kernel, so lookups subtract a load bias
//! computed from `/proc/<pid>/maps` once the tracee has been exec'd.

use crate::error::{Result, TraceError};
use nix::unistd::Pid;
use object::{Object, ObjectKind, ObjectSegment, ObjectSymbol, SymbolKind};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps an instruction pointer to a function name
pub trait SymbolResolver {
    /// Name of the function containing `address`, if known
    fn resolve(&self, address: u64) -> Option<&str>;
}

/// A function symbol from the ELF symbol tables
#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionSymbol {
    address: u64,
    size: u64,
    name: String,
}

impl FunctionSymbol {
    fn contains(&self, address: u64) -> bool {
        if self.size == 0 {
            address == self.address
        } else {
            address >= self.address && address - self.address < self.size
        }
    }
}

/// Function symbols of one executable, sorted by address
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    functions: Vec<FunctionSymbol>,
    /// Lowest `PT_LOAD` virtual address, page aligned
    image_base: u64,
    position_independent: bool,
    load_bias: u64,
}

impl SymbolTable {
    /// Load function symbols from an ELF binary
    pub fn load(binary_path: &Path) -> Result<Self> {
        let fail = |reason: String| TraceError::SymbolTable {
            path: binary_path.to_path_buf(),
            reason,
        };

        let file = File::open(binary_path).map_err(|e| fail(e.to_string()))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| fail(e.to_string()))?;
        let object = object::File::parse(&*mmap).map_err(|e| fail(e.to_string()))?;

        let functions = object
            .symbols()
            .chain(object.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition())
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                if name.is_empty() {
                    return None;
                }
                Some((sym.address(), sym.size(), name.to_string()))
            });

        let image_base = object
            .segments()
            .map(|segment| segment.address())
            .min()
            .unwrap_or(0)
            & !0xfff;

        let mut table = Self::from_symbols(functions);
        table.image_base = image_base;
        table.position_independent = object.kind() == ObjectKind::Dynamic;

        if table.is_empty() {
            return Err(fail("no function symbols (binary stripped?)".to_string()));
        }

        debug!(
            symbols = table.len(),
            pie = table.position_independent,
            "loaded symbol table from {}",
            binary_path.display()
        );
        Ok(table)
    }

    /// Build a table from `(address, size, name)` triples
    ///
    /// Duplicate addresses (the same function in `.symtab` and `.dynsym`)
    /// keep the first name seen.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64, S)>,
        S: Into<String>,
    {
        let mut functions: Vec<FunctionSymbol> = symbols
            .into_iter()
            .map(|(address, size, name)| FunctionSymbol {
                address,
                size,
                name: name.into(),
            })
            .collect();
        functions.sort_by_key(|f| f.address);
        functions.dedup_by_key(|f| f.address);

        Self {
            functions,
            ..Default::default()
        }
    }

    /// Number of function symbols
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Whether any symbol carries the given name
    pub fn contains_name(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }

    /// Offset between runtime addresses and symbol table addresses
    pub fn load_bias(&self) -> u64 {
        self.load_bias
    }

    pub fn set_load_bias(&mut self, bias: u64) {
        self.load_bias = bias;
    }

    /// Compute and apply the load bias of a running, exec'd tracee
    ///
    /// Statically positioned executables keep a zero bias.
    pub fn relocate_for(&mut self, pid: Pid, binary_path: &Path) -> Result<()> {
        if !self.position_independent {
            return Ok(());
        }

        let maps_path = format!("/proc/{pid}/maps");
        let maps = fs::read_to_string(&maps_path).map_err(|e| TraceError::SymbolTable {
            path: PathBuf::from(&maps_path),
            reason: e.to_string(),
        })?;

        let binary = fs::canonicalize(binary_path).unwrap_or_else(|_| binary_path.to_path_buf());
        let start = mapping_start(&maps, &binary).ok_or_else(|| TraceError::SymbolTable {
            path: binary.clone(),
            reason: format!("no mapping found in {maps_path}"),
        })?;

        self.load_bias = start.wrapping_sub(self.image_base);
        debug!(
            "relocated symbols for pid {}: load bias {:#x}",
            pid, self.load_bias
        );
        Ok(())
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, address: u64) -> Option<&str> {
        let address = address.wrapping_sub(self.load_bias);
        let idx = self
            .functions
            .partition_point(|f| f.address <= address)
            .checked_sub(1)?;

        let function = &self.functions[idx];
        function.contains(address).then_some(function.name.as_str())
    }
}

/// Lowest start address of a mapping backed by `binary` with file offset 0
///
/// Lines look like `start-end perms offset dev inode    pathname`. The first
/// five fields are separated by single spaces; the pathname follows padding
/// and may itself contain spaces.
fn mapping_start(maps: &str, binary: &Path) -> Option<u64> {
    maps.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(6, ' ').collect();
            if parts.len() < 6 || Path::new(parts[5].trim_start()) != binary {
                return None;
            }
            if u64::from_str_radix(parts[2], 16).ok()? != 0 {
                return None;
            }
            let (start, _) = parts[0].split_once('-')?;
            u64::from_str_radix(start, 16).ok()
        })
        .min()
}
