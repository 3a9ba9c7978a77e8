//! Random generation of case tables for fuzz-style regression batches.
//!
//! Generated commands are short pipelines and lists built from a handful of simple
//! utilities operating on sample files. The sample files are written to a `fixtures`
//! directory next to the table; commands refer to them by bare name, so they run
//! correctly in a working directory seeded from that directory.

use crate::case::GENERATED_KIND;
use crate::error::Error;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the directory, next to the generated table, holding the sample files.
pub const FIXTURES_DIR_NAME: &str = "fixtures";

const SAMPLE_FILE_COUNT: usize = 3;

const SIMPLE_COMMANDS: &[&str] = &[
    "echo", "printf", "cat", "grep", "wc", "ls", "true", "false", "sed", "head", "tail",
];

const OPERATORS: &[(&str, f64)] = &[("|", 0.35), ("&&", 0.25), ("||", 0.2), (";", 0.2)];

const REDIRECTIONS: &[&str] = &[">", ">>", "2>", "2>>"];

const WORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 _-";

const MAX_PARTS: usize = 4;
const REDIRECTION_PROBABILITY: f64 = 0.25;
const SUBSHELL_PROBABILITY: f64 = 0.05;

/// Produces random shell commands.
pub struct CommandGenerator {
    rng: StdRng,
    sample_files: Vec<String>,
}

impl CommandGenerator {
    /// Creates a generator. With a seed, output is reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            rng,
            sample_files: (0..SAMPLE_FILE_COUNT)
                .map(|i| std::format!("sample_{i}.txt"))
                .collect(),
        }
    }

    /// Returns the names of the sample files that generated commands refer to.
    pub fn sample_files(&self) -> &[String] {
        &self.sample_files
    }

    /// Produces the contents of one sample file.
    pub fn sample_contents(&mut self) -> String {
        let line_count = self.rng.random_range(2..=7);
        (1..=line_count)
            .map(|j| std::format!("line {j} {}\n", self.word(6)))
            .collect()
    }

    /// Produces one command: 1 to 4 simple commands joined by operators, each possibly
    /// redirected, occasionally wrapped in a subshell.
    pub fn command(&mut self) -> String {
        let part_count = self.rng.random_range(1..=MAX_PARTS);
        let mut parts = Vec::with_capacity(part_count * 2);

        for i in 0..part_count {
            let simple = self.simple_command();
            parts.push(self.attach_redirection(simple));

            if i + 1 < part_count {
                let op = OPERATORS
                    .choose_weighted(&mut self.rng, |(_, weight)| *weight)
                    .map_or("|", |(op, _)| *op);
                parts.push(op.to_owned());
            }
        }

        let command = parts.join(" ");
        if self.rng.random_bool(SUBSHELL_PROBABILITY) {
            std::format!("({command})")
        } else {
            command
        }
    }

    fn simple_command(&mut self) -> String {
        let command = SIMPLE_COMMANDS.choose(&mut self.rng).copied().unwrap_or("echo");

        match command {
            "echo" => {
                let word = self.word(20);
                std::format!("echo {}", quote(&word))
            }
            "printf" => {
                let word = self.word(10);
                std::format!("printf {}\\n", quote(&word))
            }
            "cat" => std::format!("cat {}", self.sample_file()),
            "grep" => {
                let pattern = self.word(4);
                std::format!("grep -n {} {} || true", quote(&pattern), self.sample_file())
            }
            "wc" => std::format!("wc -l {}", self.sample_file()),
            "ls" => {
                if self.rng.random_bool(0.8) {
                    "ls .".to_owned()
                } else {
                    "ls /nonexistent_path".to_owned()
                }
            }
            "true" => "true".to_owned(),
            "false" => "false".to_owned(),
            "sed" => std::format!("sed -n 1,2p {}", self.sample_file()),
            "head" => std::format!("head -n 2 {}", self.sample_file()),
            "tail" => std::format!("tail -n 2 {}", self.sample_file()),
            _ => "echo ok".to_owned(),
        }
    }

    fn attach_redirection(&mut self, command: String) -> String {
        if !self.rng.random_bool(REDIRECTION_PROBABILITY) {
            return command;
        }

        let redirection = REDIRECTIONS.choose(&mut self.rng).copied().unwrap_or(">");
        let n: u32 = self.rng.random_range(0..100);
        let target = if redirection.starts_with('2') {
            std::format!("err_{n}.log")
        } else {
            std::format!("out_{n}.txt")
        };

        std::format!("{command} {redirection} {target}")
    }

    fn sample_file(&mut self) -> String {
        self.sample_files
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default()
    }

    /// Produces a random word of 1 to `max_len` characters, trimmed of surrounding spaces.
    fn word(&mut self, max_len: usize) -> String {
        let len = self.rng.random_range(1..=max_len);
        let word: String = (0..len)
            .filter_map(|_| WORD_CHARS.choose(&mut self.rng).map(|b| char::from(*b)))
            .collect();

        let word = word.trim();
        if word.is_empty() {
            "x".to_owned()
        } else {
            word.to_owned()
        }
    }
}

/// Quotes a word for the shell: single quotes when it contains a double quote and no
/// single quote, double quotes otherwise.
fn quote(s: &str) -> String {
    if s.contains('"') && !s.contains('\'') {
        std::format!("'{s}'")
    } else {
        std::format!("\"{}\"", s.replace('"', "\\\""))
    }
}

/// Writes a `;`-delimited table of `count` generated cases to `out`, plus the sample files
/// in a `fixtures` directory next to it. Returns the path of the fixtures directory.
pub fn generate_table(out: &Path, count: usize, seed: Option<u64>) -> Result<PathBuf, Error> {
    let parent = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut generator = CommandGenerator::new(seed);

    let fixtures_dir = parent.join(FIXTURES_DIR_NAME);
    fs::create_dir_all(&fixtures_dir)?;
    for name in generator.sample_files().to_vec() {
        let contents = generator.sample_contents();
        fs::write(fixtures_dir.join(name), contents)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(out)?;

    writer.write_record(["id", "kind", "test"])?;
    for id in 1..=count {
        let command = generator.command();
        writer.write_record([id.to_string().as_str(), GENERATED_KIND, command.as_str()])?;
    }
    writer.flush()?;

    tracing::debug!(
        target: "load",
        "generated {count} case(s) in {} with fixtures in {}",
        out.display(),
        fixtures_dir.display()
    );

    Ok(fixtures_dir)
}
