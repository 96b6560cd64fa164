/* Codegen command - synthesize decoder plans and write the decoder IR */

use super::common::{LoadedTypes, load_and_resolve};
use crate::abi::resolved::TypeId;
use crate::codegen::shared::builder::{DecoderBuilder, DecoderOptions};
use crate::codegen::shared::ir::DecoderIr;
use crate::codegen::shared::serialization::{decoder_ir_to_json, decoder_ir_to_protobuf};
use anyhow::Context;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum IrOutputFormat {
  Json,
  Protobuf,
  Listing,
}

/* Execute the codegen command */
pub fn run(
  files: Vec<PathBuf>,
  types: Vec<String>,
  options: DecoderOptions,
  format: IrOutputFormat,
  output: Option<PathBuf>,
  verbose: bool,
) -> anyhow::Result<()> {
  /* Reports share stdout with the IR unless it goes to a file */
  let verbose = verbose && output.is_some();
  if verbose {
    println!("ABI Decoder - Decoder Synthesis Tool");
    println!("====================================\n");
    println!("[~] Configuration:");
    println!("  Strict offsets: {}", options.strict);
    println!("  Merge copies: {}", options.merge_copies);
    println!("  Format: {:?}", format);
    println!("  Input files: {}", files.len());
    for file in &files {
      println!("    - {}", file.display());
    }
    println!();
  }

  let loaded = load_and_resolve(&files, verbose)?;
  let selected = loaded.select(&types)?;
  let decoder_ir = build_decoder_ir(&loaded, &selected, options, !types.is_empty())?;
  let rendered = render(&decoder_ir, format)?;

  match output {
    Some(path) => {
      std::fs::write(&path, &rendered).with_context(|| format!("cannot write '{}'", path.display()))?;
      if verbose {
        println!(
          "[✓] Wrote {} decoder(s) to {}",
          decoder_ir.decoders.len(),
          path.display()
        );
      }
    }
    None => {
      let mut stdout = std::io::stdout().lock();
      stdout.write_all(&rendered)?;
      stdout.flush()?;
    }
  }
  Ok(())
}

/* Synthesize one decoder per root. Unsupported roots abort when they were
   requested by name and are skipped with a warning otherwise. */
pub fn build_decoder_ir(
  loaded: &LoadedTypes,
  selected: &[(String, TypeId)],
  options: DecoderOptions,
  explicit: bool,
) -> anyhow::Result<DecoderIr> {
  let mut decoders = Vec::with_capacity(selected.len());

  for (name, id) in selected {
    let built = loaded
      .layouts_for(*id)
      .map_err(anyhow::Error::from)
      .and_then(|layouts| {
        DecoderBuilder::new(&loaded.resolver.arena, &layouts, options)
          .build_decoder(*id, name)
          .map_err(anyhow::Error::from)
      });

    match built {
      Ok(decoder) => decoders.push(decoder),
      Err(err) if explicit => {
        return Err(err.context(format!("cannot synthesize a decoder for '{}'", name)));
      }
      Err(err) => {
        eprintln!("[!] Skipping '{}': {}", name, err);
      }
    }
  }

  Ok(DecoderIr::new(decoders))
}

pub fn render(decoder_ir: &DecoderIr, format: IrOutputFormat) -> anyhow::Result<Vec<u8>> {
  match format {
    IrOutputFormat::Json => {
      let mut json = decoder_ir_to_json(decoder_ir)?;
      json.push('\n');
      Ok(json.into_bytes())
    }
    IrOutputFormat::Protobuf => Ok(decoder_ir_to_protobuf(decoder_ir)?),
    IrOutputFormat::Listing => {
      let mut listing = String::new();
      writeln!(listing, "# decoder IR v{}", decoder_ir.version)?;
      for decoder in &decoder_ir.decoders {
        let mode = if decoder.strict { "strict" } else { "lenient" };
        writeln!(listing, "\ndecoder {} ({})", decoder.type_name, mode)?;
        write!(listing, "{}", decoder.plan)?;
      }
      Ok(listing.into_bytes())
    }
  }
}
