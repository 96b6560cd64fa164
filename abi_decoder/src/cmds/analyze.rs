/* Analyze command - print layouts and structural predicates */

use super::common::{LoadedTypes, load_and_resolve};
use crate::abi::layout::{Layout, LayoutTable};
use crate::abi::predicates::TypeQuery;
use crate::abi::resolved::{ResolvedTypeKind, TypeId};
use serde_derive::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct TypeReport {
  pub name: String,
  pub type_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub layout: Option<Layout>,
  pub reference_depth: u32,
  pub sequentially_copyable: bool,
  pub dynamic_children_depth: u32,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub fields: Vec<FieldReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
  pub name: String,
  pub type_name: String,
  pub calldata_head_offset: u64,
  pub memory_head_offset: u64,
  pub dynamic: bool,
}

/* Execute the analyze command */
pub fn run(files: Vec<PathBuf>, types: Vec<String>, json: bool, verbose: bool) -> anyhow::Result<()> {
  if verbose && !json {
    println!("ABI Decoder - Type Analysis Tool");
    println!("================================\n");
  }

  let loaded = load_and_resolve(&files, verbose && !json)?;
  let selected = loaded.select(&types)?;
  let reports = analyze_types(&loaded, &selected);

  if json {
    println!("{}", serde_json::to_string_pretty(&reports)?);
    return Ok(());
  }

  println!("\n[~] Resolved Type Layouts:");
  println!("==========================");
  for report in &reports {
    print_report(report);
  }

  let failed = reports.iter().filter(|report| report.error.is_some()).count();
  if failed == 0 {
    println!("\n[✓] Analysis complete: {} type(s)", reports.len());
  } else {
    println!("\n[✗] {} of {} type(s) cannot be decoded", failed, reports.len());
  }
  Ok(())
}

/* Build one report per selected root; layout failures are recorded, not fatal */
pub fn analyze_types(loaded: &LoadedTypes, selected: &[(String, TypeId)]) -> Vec<TypeReport> {
  selected
    .iter()
    .map(|(name, id)| match loaded.layouts_for(*id) {
      Ok(layouts) => type_report(loaded, &layouts, name, *id),
      Err(err) => TypeReport {
        name: name.clone(),
        type_name: loaded.resolver.arena[*id].name.clone(),
        layout: None,
        reference_depth: 0,
        sequentially_copyable: false,
        dynamic_children_depth: 0,
        fields: Vec::new(),
        error: Some(err.to_string()),
      },
    })
    .collect()
}

fn type_report(loaded: &LoadedTypes, layouts: &LayoutTable, name: &str, id: TypeId) -> TypeReport {
  let arena = &loaded.resolver.arena;
  let query = TypeQuery::new(arena, layouts);

  let fields = match &arena[id].kind {
    ResolvedTypeKind::Struct { fields } => fields
      .iter()
      .filter_map(|field| {
        let layout = layouts.get(field.type_id)?;
        Some(FieldReport {
          name: field.name.clone(),
          type_name: arena[field.type_id].name.clone(),
          calldata_head_offset: layout.calldata_head_offset,
          memory_head_offset: layout.memory_head_offset,
          dynamic: layout.dynamic,
        })
      })
      .collect(),
    _ => Vec::new(),
  };

  TypeReport {
    name: name.to_string(),
    type_name: arena[id].name.clone(),
    layout: layouts.get(id).cloned(),
    reference_depth: query.max_reference_type_depth(id),
    sequentially_copyable: query.can_be_sequentially_copied(id),
    dynamic_children_depth: query.max_dynamic_children_depth(id),
    fields,
    error: None,
  }
}

fn print_report(report: &TypeReport) {
  println!("\n[*] Type: {} ({})", report.name, report.type_name);

  if let Some(error) = &report.error {
    println!("   [✗] {}", error);
    return;
  }
  let Some(layout) = &report.layout else {
    return;
  };

  println!("   Shape: {:?}", layout.shape);
  println!("   Dynamic: {}", layout.dynamic);
  println!(
    "   Calldata: head {} bytes, tail {} bytes (member heads {})",
    layout.calldata_head_size, layout.calldata_tail_size, layout.member_head_size_calldata
  );
  println!(
    "   Memory: head {} bytes, tail {} bytes (member heads {})",
    layout.memory_head_size, layout.memory_tail_size, layout.member_head_size_memory
  );
  println!("   Minimum calldata: {} bytes", layout.minimum_bytes);
  println!(
    "   Copyable: head {}, tail {}, sequential {}",
    layout.can_copy_head, layout.can_copy_tail, report.sequentially_copyable
  );
  println!(
    "   Depth: references {}, dynamic children {}",
    report.reference_depth, report.dynamic_children_depth
  );

  if !report.fields.is_empty() {
    println!("   Fields:");
    for field in &report.fields {
      println!(
        "     - {}: {} (calldata +{}, memory +{}{})",
        field.name,
        field.type_name,
        field.calldata_head_offset,
        field.memory_head_offset,
        if field.dynamic { ", dynamic" } else { "" }
      );
    }
  }
}
