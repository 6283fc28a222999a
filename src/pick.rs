//! Run orchestration: header, compile, stream.
//!
//! A run reads the header row (in header mode), compiles the colspec against
//! it, and only then opens the output and streams data rows through the
//! projector. Compile errors therefore never leave partial output behind.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    cli::Cli,
    colspec::{CompiledSpec, HeaderMap},
    expr::{EvalexprEngine, ExpressionEngine},
    io_utils,
    project::{project, project_header},
};

#[derive(Debug, Clone, Copy)]
pub struct PickOptions {
    pub use_headers: bool,
    /// In header mode, emit the header row projected through the colspec.
    pub write_header: bool,
    pub input_encoding: &'static Encoding,
}

impl Default for PickOptions {
    fn default() -> Self {
        PickOptions {
            use_headers: false,
            write_header: true,
            input_encoding: UTF_8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PickSummary {
    pub header_written: bool,
    pub rows_written: usize,
    pub empty_rows_skipped: usize,
}

/// A compiled colspec together with the header it was compiled against.
#[derive(Debug)]
pub struct PickPlan {
    spec: CompiledSpec,
    header: Option<Vec<String>>,
}

impl PickPlan {
    /// Consumes the header row from `reader` when header mode is on, then
    /// compiles `colspec`. No data row is read.
    pub fn prepare<R: Read>(
        colspec: &str,
        engine: &dyn ExpressionEngine,
        reader: &mut csv::Reader<R>,
        options: &PickOptions,
    ) -> Result<Self> {
        let header = if options.use_headers {
            let mut record = ByteRecord::new();
            let found = reader
                .read_byte_record(&mut record)
                .context("Reading header row")?;
            if found {
                Some(
                    io_utils::decode_record(&record, options.input_encoding)
                        .context("Decoding header row")?,
                )
            } else {
                debug!("Input is empty; no header row available");
                Some(Vec::new())
            }
        } else {
            None
        };
        let header_map = header.as_deref().map(HeaderMap::from_headers);
        let spec = CompiledSpec::compile(colspec, header_map.as_ref(), engine)
            .with_context(|| format!("Compiling column specification '{colspec}'"))?;
        debug!(
            "Compiled {} selector(s){}",
            spec.len(),
            if spec.has_filters() { " with filters" } else { "" }
        );
        Ok(PickPlan { spec, header })
    }

    pub fn spec(&self) -> &CompiledSpec {
        &self.spec
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Streams every remaining record of `reader` into `writer`. Stops at the
    /// first error; rows written before it stay written.
    pub fn run<R: Read, W: Write>(
        &self,
        reader: &mut csv::Reader<R>,
        writer: &mut csv::Writer<W>,
        options: &PickOptions,
    ) -> Result<PickSummary> {
        let mut summary = PickSummary::default();
        if let Some(header) = self.header() {
            if options.write_header && !header.is_empty() {
                let projected = project_header(&self.spec, header)?;
                writer
                    .write_record(&projected)
                    .context("Writing header row")?;
                summary.header_written = true;
            }
        }

        let header_names = self.header();
        let mut record = ByteRecord::new();
        while reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading row {}", summary.rows_written))?
        {
            let row = io_utils::decode_record(&record, options.input_encoding)
                .with_context(|| format!("Decoding row {}", summary.rows_written))?;
            match project(&self.spec, &row, summary.rows_written, header_names)? {
                Some(projected) => {
                    writer
                        .write_record(&projected)
                        .with_context(|| format!("Writing row {}", summary.rows_written))?;
                    summary.rows_written += 1;
                }
                None => {
                    debug!(
                        "Skipping empty record at line {}",
                        record.position().map_or(0, |pos| pos.line())
                    );
                    summary.empty_rows_skipped += 1;
                }
            }
        }
        writer.flush().context("Flushing output")?;
        Ok(summary)
    }
}

/// Compiles and runs `colspec` over one reader/writer pair.
pub fn pick_records<R: Read, W: Write>(
    colspec: &str,
    engine: &dyn ExpressionEngine,
    reader: &mut csv::Reader<R>,
    writer: &mut csv::Writer<W>,
    options: &PickOptions,
) -> Result<PickSummary> {
    PickPlan::prepare(colspec, engine, reader, options)?.run(reader, writer, options)
}

pub fn execute(args: &Cli) -> Result<()> {
    let input_path = args.input.as_deref();
    let output_path = args.output.as_deref();
    let delimiter = io_utils::resolve_input_delimiter(input_path, args.input_delimiter);
    let output_delimiter = io_utils::resolve_output_delimiter(output_path, args.output_delimiter);
    let input_encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    info!(
        "Picking '{}' from {} -> {} (delimiter '{}', output '{}')",
        args.colspec,
        describe_path(input_path, "stdin"),
        describe_path(output_path, "stdout"),
        crate::printable_delimiter(delimiter),
        crate::printable_delimiter(output_delimiter)
    );

    let options = PickOptions {
        use_headers: args.use_headers,
        write_header: !args.no_header_output,
        input_encoding,
    };
    let engine = EvalexprEngine;
    let mut reader = io_utils::open_csv_reader_from_path(input_path, delimiter)?;
    let plan = PickPlan::prepare(&args.colspec, &engine, &mut reader, &options)?;

    if args.explain {
        let rendered = serde_json::to_string_pretty(&plan.spec().describe())
            .context("Rendering compiled column specification")?;
        println!("{rendered}");
        return Ok(());
    }

    let mut writer =
        io_utils::open_csv_writer_to_path(output_path, output_delimiter, output_encoding)?;
    let summary = plan.run(&mut reader, &mut writer, &options)?;
    info!(
        "Wrote {} row(s){}; skipped {} empty row(s)",
        summary.rows_written,
        if summary.header_written {
            " plus header"
        } else {
            ""
        },
        summary.empty_rows_skipped
    );
    Ok(())
}

fn describe_path(path: Option<&std::path::Path>, fallback: &str) -> String {
    match path {
        Some(p) if !io_utils::is_dash(p) => format!("{p:?}"),
        _ => fallback.to_string(),
    }
}
