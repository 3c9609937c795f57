use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_INGEST_HOST: &str = "localhost";
pub const DEFAULT_INGEST_PORT: u16 = 5000;
pub const DEFAULT_DATA_FILE: &str = "storage/data.json";
pub const DEFAULT_PUBLIC_DIR: &str = "public";

#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("Invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("Invalid command line flag value")]
    InvalidCommandLineFlagValue,
}

/// Addresses and paths every component is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub ingest_host: String,
    pub ingest_port: u16,
    pub data_file: PathBuf,
    pub public_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            ingest_host: DEFAULT_INGEST_HOST.to_string(),
            ingest_port: DEFAULT_INGEST_PORT,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
        }
    }
}

impl Config {
    /// Builds a configuration from process arguments, the first of which is
    /// the program name and is skipped.
    ///
    /// Supported flags: `--port`, `--ingest-host`, `--ingest-port`,
    /// `--data-file` and `--public-dir`. Anything not given keeps its default.
    pub fn from_args<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut config = Config::default();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => config.http_port = parse_port(&flag_value(&mut iter)?)?,
                "--ingest-port" => config.ingest_port = parse_port(&flag_value(&mut iter)?)?,
                "--ingest-host" => config.ingest_host = flag_value(&mut iter)?,
                "--data-file" => config.data_file = PathBuf::from(flag_value(&mut iter)?),
                "--public-dir" => config.public_dir = PathBuf::from(flag_value(&mut iter)?),
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        Ok(config)
    }

    pub fn http_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn ingest_address(&self) -> String {
        format!("{}:{}", self.ingest_host, self.ingest_port)
    }
}

fn flag_value<I: Iterator<Item = String>>(iter: &mut I) -> Result<String, CliError> {
    match iter.next() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(CliError::InvalidCommandLineFlagValue),
    }
}

fn parse_port(value: &str) -> Result<u16, CliError> {
    let port_number = value
        .parse::<u32>()
        .map_err(|_| CliError::InvalidCommandLineFlagValue)?;

    if port_number < 1 || port_number > 65535 {
        return Err(CliError::InvalidCommandLineFlagValue);
    }

    Ok(port_number as u16)
}
