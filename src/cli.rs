use clap::Parser;

use crate::extract::SymlinkPolicy;

#[derive(Parser, Debug)]
#[command(name = "zipdrop")]
#[command(version)]
#[command(about = "Extract ZIP archives, local or remote, with permissions and symlinks", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipdrop data1.zip -x joe          extract all files except joe from data1.zip\n  \
  zipdrop -o -d out release.zip     replace out/ with the contents of release.zip\n  \
  zipdrop https://example.com/archive.zip -d out   extract a remote ZIP")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    pub extract_dir: String,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Delete the target directory before extracting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Always create real symlinks, even where that needs extra privileges
    #[arg(long)]
    pub strict_symlinks: bool,

    /// Write symlinks as plain files containing the link target
    #[arg(long, conflicts_with = "strict_symlinks")]
    pub symlinks_as_files: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn symlink_policy(&self) -> SymlinkPolicy {
        if self.strict_symlinks {
            SymlinkPolicy::AlwaysRealSymlink
        } else if self.symlinks_as_files {
            SymlinkPolicy::AlwaysPlainFile
        } else {
            SymlinkPolicy::PlatformDefault
        }
    }
}

/// Whether `name` contains, or glob-matches, any of `patterns`.
pub fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns
        .iter()
        .any(|x| name.contains(x.as_str()) || glob_match(x, name))
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("file?.dat", "file1.dat"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star: skip it, or let it swallow one more character
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_wildcards() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(glob_match("docs/*", "docs/a/b.md"));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(!glob_match("file?.dat", "file.dat"));
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["zipdrop", "a.zip", "-d", "out", "-o", "-x", "*.log", "tmp/"]);
        assert_eq!(cli.extract_dir, "out");
        assert!(cli.overwrite);
        assert!(matches_any(&cli.exclude, "build/debug.log"));
        assert!(matches_any(&cli.exclude, "tmp/cache"));
        assert!(!matches_any(&cli.exclude, "src/main.rs"));
        assert_eq!(cli.symlink_policy(), SymlinkPolicy::PlatformDefault);
    }

    #[test]
    fn symlink_flags() {
        let cli = Cli::parse_from(["zipdrop", "a.zip", "--strict-symlinks"]);
        assert_eq!(cli.symlink_policy(), SymlinkPolicy::AlwaysRealSymlink);
        let cli = Cli::parse_from(["zipdrop", "a.zip", "--symlinks-as-files"]);
        assert_eq!(cli.symlink_policy(), SymlinkPolicy::AlwaysPlainFile);
        assert!(Cli::try_parse_from(["zipdrop", "a.zip", "--strict-symlinks", "--symlinks-as-files"]).is_err());
    }

    #[test]
    fn recognises_urls() {
        let cli = Cli::parse_from(["zipdrop", "https://example.com/a.zip"]);
        assert!(cli.is_http_url());
        assert_eq!(cli.extract_dir, ".");
    }
}
