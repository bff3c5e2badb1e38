//! Loading of configuration files referenced from the command line

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read each PEM file into a string, keeping the order given.
pub fn load_pem_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            fs::read_to_string(path)
                .with_context(|| format!("cannot read certificate file {}", path.display()))
        })
        .collect()
}
