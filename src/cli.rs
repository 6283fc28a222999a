use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Pick, reorder, and transform columns of delimited text",
    long_about = None
)]
pub struct Cli {
    /// Column specification such as `0,name,2-4,%` or `"price|to_number(value) * 1.2"`
    pub colspec: String,
    /// Input file (stdin if omitted or `-`)
    pub input: Option<PathBuf>,
    /// Output file (stdout if omitted or `-`)
    pub output: Option<PathBuf>,
    /// Input delimiter (supports ',', 'tab', ';', '|')
    #[arg(short = 'f', long = "ifs", value_parser = parse_delimiter)]
    pub input_delimiter: Option<u8>,
    /// Output delimiter (defaults to ',' regardless of the input delimiter)
    #[arg(short = 'F', long = "ofs", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Treat the first record as column names
    #[arg(short = 'H', long = "use-headers")]
    pub use_headers: bool,
    /// Do not write the projected header row in header mode
    #[arg(long = "no-header-output")]
    pub no_header_output: bool,
    /// Character encoding of the input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding for the output file/stdout (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print the compiled column specification as JSON instead of processing rows
    #[arg(long)]
    pub explain: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
