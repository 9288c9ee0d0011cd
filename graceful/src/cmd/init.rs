//! `graceful init` command: write the commented runner configuration.
//!
//! Missing parent directories are created. Without `--force` the file is
//! opened with `create_new`, so an existing config is never clobbered, even
//! if it appears between the check and the write.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use graceful::Error;

use crate::config::generate_default_config;

/// Execute the `init` command.
///
/// # Errors
///
/// Returns [`Error::Config`] if `output` exists and `force` is `false`, or
/// if the directory or file cannot be written.
#[allow(clippy::print_stderr)]
pub fn run(output: &Path, force: bool) -> Result<(), Error> {
    write_template(output, force)?;
    eprintln!(
        "Config file written to {0}; start with `graceful run -c {0}`",
        output.display()
    );
    Ok(())
}

fn write_template(output: &Path, force: bool) -> Result<(), Error> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            Error::config_with(format!("failed to create '{}'", parent.display()), e)
        })?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(output).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => Error::Config(format!(
            "'{}' already exists, use --force to overwrite",
            output.display()
        )),
        _ => Error::config_with(format!("failed to open '{}'", output.display()), e),
    })?;
    file.write_all(generate_default_config().as_bytes())
        .map_err(|e| Error::config_with(format!("failed to write '{}'", output.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("etc/graceful/graceful.toml");

        write_template(&output, false).expect("template written");
        let written = fs::read_to_string(&output).expect("readable");
        assert_eq!(written, generate_default_config());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("temp dir");
        let output = dir.path().join("graceful.toml");
        fs::write(&output, "log_level = \"debug\"\n").expect("seed file");

        let err = write_template(&output, false).expect_err("existing file kept");
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            fs::read_to_string(&output).expect("readable"),
            "log_level = \"debug\"\n"
        );

        write_template(&output, true).expect("forced overwrite");
        assert_eq!(
            fs::read_to_string(&output).expect("readable"),
            generate_default_config()
        );
    }
}
