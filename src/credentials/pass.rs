//! Password-store (pass) credential backend.
//!
//! One pass entry holds the OAuth credentials as `name: value` lines below
//! the first (password) line. Writing a key rewrites the entry in place and
//! keeps every other line.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::CredentialStore;

/// Credential store backed by a single pass entry.
pub struct PassCredentialStore {
    entry_path: String,
    program: String,
}

impl PassCredentialStore {
    pub fn new(entry_path: impl Into<String>) -> Self {
        Self {
            entry_path: entry_path.into(),
            program: "pass".to_string(),
        }
    }

    /// Use a different executable in place of `pass` (useful for tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn read_entry(&self) -> Result<PassEntry> {
        let output = Command::new(&self.program)
            .arg("show")
            .arg(&self.entry_path)
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass show {} failed: {}", self.entry_path, stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;
        Ok(PassEntry::parse(&content))
    }

    fn write_entry(&self, entry: &PassEntry) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("insert")
            .arg("--multiline")
            .arg("--force")
            .arg(&self.entry_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(entry.to_string().as_bytes())
                .context("Failed to write to pass stdin")?;
        }

        let status = child.wait().context("Failed to wait for pass command")?;
        if !status.success() {
            anyhow::bail!("pass insert {} failed", self.entry_path);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    fn name(&self) -> &str {
        "pass"
    }

    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.read_entry()?;
        Ok(entry
            .fields
            .get(key)
            .map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        // A missing entry is created from scratch.
        let mut entry = self.read_entry().unwrap_or_default();
        entry
            .fields
            .insert(key.to_string(), value.expose_secret().to_string());
        self.write_entry(&entry)
    }
}

/// Parsed pass entry.
#[derive(Debug, Default, PartialEq, Eq)]
struct PassEntry {
    /// The first line, kept verbatim.
    first_line: Option<String>,
    fields: BTreeMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let first_line = lines.next().map(str::to_string);
        let fields = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self { first_line, fields }
    }
}

impl std::fmt::Display for PassEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.first_line.as_deref().unwrap_or(""))?;
        for (key, value) in &self.fields {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}
