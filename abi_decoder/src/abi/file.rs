use crate::abi::json_abi::parse_json_abi;
use crate::abi::types::{AbiFile, FunctionDef, TypeDef};
use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/* Collects type definitions and function signatures from one or more files */
#[derive(Debug, Default)]
pub struct TypeFileLoader {
    /* Canonical paths already read, so repeated -f arguments are harmless */
    loaded_files: HashSet<PathBuf>,

    /* All collected type definitions, in file then declaration order */
    all_types: Vec<TypeDef>,

    /* All collected function signatures */
    all_functions: Vec<FunctionDef>,
}

impl TypeFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /* Load a YAML/JSON type file or a Solidity JSON ABI */
    pub fn load_file(&mut self, file_path: &Path, verbose: bool) -> anyhow::Result<()> {
        let canonical_path = file_path
            .canonicalize()
            .with_context(|| format!("cannot open '{}'", file_path.display()))?;

        if !self.loaded_files.insert(canonical_path) {
            if verbose {
                println!("    [~] Skipping already loaded file: {}", file_path.display());
            }
            return Ok(());
        }

        if verbose {
            println!("[~] Loading type file: {}", file_path.display());
        }

        let contents = std::fs::read_to_string(file_path)
            .with_context(|| format!("cannot read '{}'", file_path.display()))?;
        let abi_file = parse_type_file(file_path, &contents)
            .with_context(|| format!("cannot parse '{}'", file_path.display()))?;

        if verbose {
            if let Some(package) = &abi_file.package {
                println!("    Package: {}", package);
            }
            println!(
                "    Types: {}, functions: {}",
                abi_file.types.len(),
                abi_file.functions.len()
            );
        }
        debug!(
            path = %file_path.display(),
            types = abi_file.types.len(),
            functions = abi_file.functions.len(),
            "loaded type file"
        );

        self.all_types.extend(abi_file.types);
        self.all_functions.extend(abi_file.functions);
        Ok(())
    }

    pub fn types(&self) -> &[TypeDef] {
        &self.all_types
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.all_functions
    }

    pub fn loaded_file_count(&self) -> usize {
        self.loaded_files.len()
    }
}

/* `.json` files holding a top-level array are Solidity JSON ABIs */
pub fn parse_type_file(path: &Path, contents: &str) -> anyhow::Result<AbiFile> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        if contents.trim_start().starts_with('[') {
            return Ok(parse_json_abi(contents)?);
        }
        return Ok(serde_json::from_str(contents)?);
    }
    Ok(serde_yml::from_str(contents)?)
}
