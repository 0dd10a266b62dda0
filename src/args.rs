use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// A path or URL of the manifest: either grouped JSON or a file with one `URL [filename]` per line.
    /// Blank lines and lines starting with `#` or `//` are ignored.
    /// Falls back to `manifest` from the config file when omitted.
    pub input: Option<String>,

    /// Config file to read instead of the one in the user data directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to place downloaded files in. Defaults to the current directory.
    #[arg(short, long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Only download these groups of a grouped manifest. Can be given multiple times.
    #[arg(short, long = "group", value_name = "NAME", action = clap::ArgAction::Append)]
    pub groups: Vec<String>,

    /// Total number of attempts per file, including the first one.
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Wait number of seconds after a failed attempt before retry. Fractions are supported.
    #[arg(long, value_name = "Seconds")]
    pub waitretry: Option<f64>,

    /// Seconds to wait for a connection to be established.
    #[arg(long, value_name = "Seconds")]
    pub connect_timeout: Option<f64>,

    /// Seconds to wait for the next chunk of a response before giving up on the attempt.
    #[arg(long, value_name = "Seconds")]
    pub read_timeout: Option<f64>,

    /// Size of the write buffer in bytes.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// User agent to use for making requests.
    #[arg(short = 'U', long)]
    pub user_agent: Option<String>,

    #[arg(long, value_name = "(http(s)|socks)://")]
    pub proxy: Option<String>,

    /// Custom HTTP headers to include in each request. Specify as `KEY:VALUE`.
    #[arg(long = "header", value_name = "KEY:VALUE", num_args = 0.., action = clap::ArgAction::Append)]
    pub headers: Vec<String>,

    /// Stop retrying a file when the server answers with a permanent error such as 404.
    #[arg(long, default_value_t = false, overrides_with = "no_fail_fast")]
    pub fail_fast: bool,

    /// Keep retrying on permanent errors even if the config file enables fail_fast.
    #[arg(long, default_value_t = false, overrides_with = "fail_fast")]
    pub no_fail_fast: bool,

    /// Check sha1/sha256 digests from the manifest before publishing a file.
    #[arg(long, default_value_t = false, overrides_with = "no_verify_checksums")]
    pub verify_checksums: bool,

    /// Skip digest checks even if the config file enables verify_checksums.
    #[arg(long, default_value_t = false, overrides_with = "verify_checksums")]
    pub no_verify_checksums: bool,
}

/// An on/off flag pair wins over the config value, which wins over `false`.
fn resolve_switch(on: bool, off: bool, configured: Option<bool>) -> bool {
    if on {
        true
    } else if off {
        false
    } else {
        configured.unwrap_or(false)
    }
}

impl Args {
    pub fn fail_fast(&self, configured: Option<bool>) -> bool {
        resolve_switch(self.fail_fast, self.no_fail_fast, configured)
    }

    pub fn verify_checksums(&self, configured: Option<bool>) -> bool {
        resolve_switch(self.verify_checksums, self.no_verify_checksums, configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "partfetch",
            "urls.json",
            "--base-dir",
            "/data",
            "--group",
            "a",
            "--group",
            "b",
            "--max-attempts",
            "5",
            "--waitretry",
            "0.5",
            "--header",
            "Authorization: Bearer x",
            "--fail-fast",
        ])
        .unwrap();
        assert_eq!(args.input.as_deref(), Some("urls.json"));
        assert_eq!(args.base_dir, Some(PathBuf::from("/data")));
        assert_eq!(args.groups, vec!["a", "b"]);
        assert_eq!(args.max_attempts, Some(5));
        assert_eq!(args.waitretry, Some(0.5));
        assert_eq!(args.headers, vec!["Authorization: Bearer x"]);
        assert!(args.fail_fast);
        assert!(!args.verify_checksums);
    }

    #[test]
    fn test_cli_switches_override_config() {
        let args = Args::try_parse_from(["partfetch", "--no-fail-fast"]).unwrap();
        assert!(!args.fail_fast(Some(true)));
        assert!(!args.verify_checksums(None));
        assert!(args.verify_checksums(Some(true)));

        let args = Args::try_parse_from(["partfetch", "--verify-checksums"]).unwrap();
        assert!(args.verify_checksums(Some(false)));

        // the last of a pair wins
        let args =
            Args::try_parse_from(["partfetch", "--verify-checksums", "--no-verify-checksums"])
                .unwrap();
        assert!(!args.verify_checksums(Some(true)));
    }

    #[test]
    fn test_everything_is_optional() {
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        assert!(args.input.is_none());
        assert!(args.groups.is_empty());
    }
}
