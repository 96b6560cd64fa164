/* Common utilities shared between analyze and codegen commands */

use crate::abi::file::TypeFileLoader;
use crate::abi::layout::{LayoutError, LayoutTable, compute_layouts_for};
use crate::abi::resolved::{TypeId, TypeResolver};
use anyhow::Context;
use std::path::PathBuf;

/* A resolved set of type files */
pub struct LoadedTypes {
  pub resolver: TypeResolver,

  /* Named types followed by function parameter lists, in declaration order */
  pub roots: Vec<(String, TypeId)>,
}

impl LoadedTypes {
  /* Layouts are computed per root so one unsupported type does not sink the rest */
  pub fn layouts_for(&self, root: TypeId) -> Result<LayoutTable, LayoutError> {
    compute_layouts_for(&self.resolver.arena, root)
  }

  /* Roots named in `requested`, or every root when nothing was requested */
  pub fn select(&self, requested: &[String]) -> anyhow::Result<Vec<(String, TypeId)>> {
    if requested.is_empty() {
      return Ok(self.roots.clone());
    }
    requested
      .iter()
      .map(|name| {
        self
          .roots
          .iter()
          .find(|(root, _)| root == name)
          .cloned()
          .ok_or_else(|| anyhow::anyhow!("unknown type or function '{}'", name))
      })
      .collect()
  }
}

/* Load every file and resolve named types and function parameters */
pub fn load_and_resolve(files: &[PathBuf], verbose: bool) -> anyhow::Result<LoadedTypes> {
  let mut loader = TypeFileLoader::new();
  for file in files {
    loader.load_file(file, verbose)?;
  }

  if verbose {
    println!(
      "\n[~] Loaded {} file(s): {} type definition(s), {} function(s)",
      loader.loaded_file_count(),
      loader.types().len(),
      loader.functions().len()
    );
    for typedef in loader.types() {
      println!("  - {}", typedef.name);
    }
    println!();
    println!("[~] Performing type resolution...");
  }

  let mut resolver = TypeResolver::new();
  for typedef in loader.types() {
    resolver.add_typedef(typedef.clone())?;
  }
  resolver.resolve_all().context("Type resolution failed")?;

  let mut roots: Vec<(String, TypeId)> = resolver
    .roots()
    .map(|(name, id)| (name.to_string(), id))
    .collect();

  for function in loader.functions() {
    let id = resolver
      .resolve_params(&function.name, &function.params)
      .with_context(|| format!("cannot resolve parameters of '{}'", function.name))?;
    roots.push((function.name.clone(), id));
  }

  if verbose {
    println!("[✓] Type resolution successful ({} root(s))", roots.len());
  }

  Ok(LoadedTypes { resolver, roots })
}
