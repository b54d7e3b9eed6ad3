//! Migration file discovery, parsing and generation
//!
//! Migration files live flat in one directory and are named
//! `migration_{YYYYMMDDHHMMSS}_{slug}.sql`. Lexical order of the names is the
//! order they are applied in.
//!
//! A file may embed the statements that undo it:
//!
//! ```sql
//! CREATE TABLE notes (id SERIAL PRIMARY KEY, body TEXT NOT NULL);
//!
//! -- ROLLBACK:
//! DROP TABLE notes;
//! -- END ROLLBACK
//! ```
//!
//! The end marker is optional; end of file closes the block as well.

use crate::migration::MigrationError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Marker that opens the embedded rollback block
pub const ROLLBACK_START: &str = "-- ROLLBACK:";

/// Marker that closes the embedded rollback block
pub const ROLLBACK_END: &str = "-- END ROLLBACK";

/// Names the store treats as migrations: `migration_*.sql`
static MIGRATION_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^migration_.*\.sql$").expect("static migration file pattern"));

/// `migration_{version}_{slug}.sql`, for names produced by [`MigrationStore::create`]
static VERSIONED_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^migration_(\d+)_(.+)\.sql$").expect("static versioned file pattern"));

/// Represents a discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Path to the migration file
    pub path: PathBuf,

    /// File name; this is also the key recorded in the ledger
    pub name: String,
}

impl MigrationFile {
    /// Whether `filename` looks like a migration (`migration_*.sql`)
    pub fn is_migration_name(filename: &str) -> bool {
        MIGRATION_FILE_NAME.is_match(filename)
    }

    /// Split a file name into its version and slug
    ///
    /// # Example
    /// - `migration_20240120120000_create_users.sql` → `("20240120120000", "create_users")`
    pub fn parse_filename(filename: &str) -> Option<(&str, &str)> {
        let caps = VERSIONED_FILE_NAME.captures(filename)?;
        Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
    }

    /// Version (sort key) part of the file name, if it has one
    pub fn version(&self) -> Option<&str> {
        Self::parse_filename(&self.name).map(|(version, _)| version)
    }
}

/// Forward and rollback SQL read from one migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Statements applied by `up`: the file without its rollback block
    pub forward_sql: String,

    /// Trimmed body of the rollback block; `None` when the file has no start marker
    pub rollback_sql: Option<String>,
}

impl MigrationScript {
    /// Split migration file content into forward and rollback SQL
    ///
    /// `file` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidFormat` when the markers are unbalanced: an end
    /// marker without a start marker, an end marker before the start marker, or more
    /// than one of either.
    pub fn parse(file: &str, content: &str) -> Result<Self, MigrationError> {
        let invalid = |reason: &str| MigrationError::InvalidFormat {
            file: file.to_string(),
            reason: reason.to_string(),
        };

        let Some(start) = content.find(ROLLBACK_START) else {
            if content.contains(ROLLBACK_END) {
                return Err(invalid("found '-- END ROLLBACK' without a preceding '-- ROLLBACK:'"));
            }
            return Ok(Self {
                forward_sql: content.to_string(),
                rollback_sql: None,
            });
        };

        if content[..start].contains(ROLLBACK_END) {
            return Err(invalid("'-- END ROLLBACK' appears before '-- ROLLBACK:'"));
        }

        let body_start = start + ROLLBACK_START.len();
        let rest = &content[body_start..];
        if rest.contains(ROLLBACK_START) {
            return Err(invalid("more than one '-- ROLLBACK:' block"));
        }

        let (body, trailing) = match rest.find(ROLLBACK_END) {
            Some(end) => {
                let trailing = &rest[end + ROLLBACK_END.len()..];
                if trailing.contains(ROLLBACK_END) {
                    return Err(invalid("more than one '-- END ROLLBACK' marker"));
                }
                (&rest[..end], trailing)
            }
            None => (rest, ""),
        };

        let mut forward_sql = String::with_capacity(start + trailing.len());
        forward_sql.push_str(&content[..start]);
        forward_sql.push_str(trailing);

        Ok(Self {
            forward_sql,
            rollback_sql: Some(body.trim().to_string()),
        })
    }

    /// Rollback SQL that would actually do something
    ///
    /// `None` when there is no block, or when the block holds nothing but blank
    /// lines and `--` comments (an unfilled template).
    pub fn executable_rollback(&self) -> Option<&str> {
        self.rollback_sql
            .as_deref()
            .filter(|sql| has_statements(sql))
    }
}

/// True if `sql` contains anything besides whitespace and `--` line comments
fn has_statements(sql: &str) -> bool {
    sql.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

/// Turn a human-readable migration name into a file name slug
///
/// Lowercases, collapses every run of non-alphanumeric characters into a single
/// underscore and trims underscores from both ends.
///
/// # Example
/// - `"Add Users' E-mail!"` → `"add_users_e_mail"`
pub fn sanitize_name(human_name: &str) -> String {
    let mut slug = String::with_capacity(human_name.len());
    let mut pending_separator = false;

    for c in human_name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Directory of migration files
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: PathBuf,
}

impl MigrationStore {
    /// Create a store rooted at `dir`; nothing is read until asked
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory this store reads from and writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List migration files, sorted by name (oldest first)
    ///
    /// Entries that are not regular files, or whose names do not match
    /// `migration_*.sql`, are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Io` if the directory is missing or unreadable.
    pub fn list(&self) -> Result<Vec<MigrationFile>, MigrationError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| MigrationError::io(&self.dir, e))?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::io(&self.dir, e))?;
            let path = entry.path();

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                log::debug!("skipping non UTF-8 file name {}", path.display());
                continue;
            };
            if !MigrationFile::is_migration_name(&name) || !path.is_file() {
                continue;
            }

            migrations.push(MigrationFile { path, name });
        }

        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(migrations)
    }

    /// Read one migration file and split it into forward and rollback SQL
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `filename` is not a plain `migration_*.sql` name
    /// - `Io` if the file cannot be read
    /// - `InvalidFormat` if its rollback markers are unbalanced
    pub fn read(&self, filename: &str) -> Result<MigrationScript, MigrationError> {
        if !MigrationFile::is_migration_name(filename) || filename.contains(['/', '\\']) {
            return Err(MigrationError::InvalidArgument(format!(
                "'{filename}' is not a migration file name (expected migration_*.sql)"
            )));
        }

        let path = self.dir.join(filename);
        let content = fs::read_to_string(&path).map_err(|e| MigrationError::io(&path, e))?;
        MigrationScript::parse(filename, &content)
    }

    /// Generate a new, timestamped migration file from the template
    ///
    /// See [`create_at`](Self::create_at).
    pub fn create(&self, human_name: &str) -> Result<String, MigrationError> {
        self.create_at(human_name, Utc::now())
    }

    /// Generate a new migration file stamped with `now`
    ///
    /// Creates the directory if needed and returns the new file name. An existing
    /// file is never overwritten.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the name is empty, has no alphanumeric characters, or
    ///   contains a rollback marker
    /// - `Io` if the directory or file cannot be created
    pub fn create_at(&self, human_name: &str, now: DateTime<Utc>) -> Result<String, MigrationError> {
        let human_name = human_name.trim();
        if human_name.is_empty() {
            return Err(MigrationError::InvalidArgument(
                "Migration name is required".to_string(),
            ));
        }
        if human_name.contains(ROLLBACK_START) || human_name.contains(ROLLBACK_END) {
            return Err(MigrationError::InvalidArgument(
                "Migration name must not contain rollback markers".to_string(),
            ));
        }

        let slug = sanitize_name(human_name);
        if slug.is_empty() {
            return Err(MigrationError::InvalidArgument(format!(
                "Migration name '{human_name}' has no letters or digits"
            )));
        }

        let filename = format!("migration_{}_{}.sql", now.format("%Y%m%d%H%M%S"), slug);
        let template = render_template(human_name, now);

        // The template must round-trip through the parser with an empty rollback block
        let script = MigrationScript::parse(&filename, &template)?;
        if script.rollback_sql.is_none() {
            return Err(MigrationError::InvalidFormat {
                file: filename,
                reason: "generated template has no rollback block".to_string(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(|e| MigrationError::io(&self.dir, e))?;

        let path = self.dir.join(&filename);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| MigrationError::io(&path, e))?;
        file.write_all(template.as_bytes())
            .map_err(|e| MigrationError::io(&path, e))?;

        log::info!("Migration file created: {filename}");
        Ok(filename)
    }
}

fn render_template(human_name: &str, now: DateTime<Utc>) -> String {
    // Keep the header on one comment line whatever the name contains
    let header_name: String = human_name
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    format!(
        "-- Migration: {header_name}\n\
         -- Created at: {created}\n\
         \n\
         -- Write your migration SQL here\n\
         -- For example:\n\
         -- ALTER TABLE table_name ADD COLUMN new_column VARCHAR(255);\n\
         \n\
         {ROLLBACK_START}\n\
         -- Write the statements that undo this migration here\n\
         -- For example:\n\
         -- ALTER TABLE table_name DROP COLUMN new_column;\n\
         {ROLLBACK_END}\n",
        created = now.to_rfc3339(),
    )
}
