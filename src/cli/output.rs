//! Colored output helpers for the CLI

use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Colored output, the default on a terminal
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Plain output with bracketed tags, for `--no-color` and log capture
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the labrelay name and version
    pub fn banner(&self) {
        if self.colored {
            println!(
                "\n   {} {}\n",
                "labrelay".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!("\n   labrelay v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message to stderr
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            println!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n {}\n", title.bright_white().bold().underline());
        } else {
            println!("\n {}\n", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("  {:>20}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("  {:>20}: {}", key, value);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "→".cyan(), message.dimmed());
        } else {
            println!("  -> {}", message);
        }
    }

    /// Print a provider line with whether its API key is available
    pub fn provider(&self, name: &str, detail: &str, key: KeyState<'_>) {
        let (mark, note) = match key {
            KeyState::NotNeeded => ("-", "no key needed".to_string()),
            KeyState::Set(env) => ("ok", format!("{} set", env)),
            KeyState::Missing(env) => ("missing", format!("{} not set", env)),
        };
        if self.colored {
            let mark = match key {
                KeyState::Missing(_) => mark.red().bold().to_string(),
                KeyState::Set(_) => mark.green().to_string(),
                KeyState::NotNeeded => mark.dimmed().to_string(),
            };
            println!("  {:>20}: {} [{} {}]", name.dimmed(), detail.bright_white(), mark, note.dimmed());
        } else {
            println!("  {:>20}: {} [{} {}]", name, detail, mark, note);
        }
    }
}

/// Availability of a provider's API key variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState<'a> {
    NotNeeded,
    Set(&'a str),
    Missing(&'a str),
}

impl<'a> KeyState<'a> {
    /// Look `env` up in the process environment.
    pub fn of(env: Option<&'a str>) -> Self {
        match env {
            None => KeyState::NotNeeded,
            Some(var) if std::env::var_os(var).is_some() => KeyState::Set(var),
            Some(var) => KeyState::Missing(var),
        }
    }
}
