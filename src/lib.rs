pub mod cli;
pub mod colspec;
pub mod data;
pub mod error;
pub mod expr;
pub mod io_utils;
pub mod pick;
pub mod project;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::Cli;

pub use crate::{
    colspec::{CompiledSpec, HeaderMap, MetadataField, SelectorEntry, SelectorKind},
    error::{ColspecError, RecordPosition},
    expr::{
        CompiledExpression, EvalexprEngine, EvaluationContext, ExpressionEngine, RowScope,
    },
    project::{project, project_header},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_pick", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    pick::execute(&cli)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
