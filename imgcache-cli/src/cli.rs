use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Image resource disk cache",
    long_about = "Resolve remote images into a local disk cache.\n\
                  \n\
                  Each resource is stored under a directory named after its host, in a file\n\
                  named after a digest of its path. Cached files are served without touching\n\
                  the network; misses are downloaded, or deferred when offline."
)]
pub struct CliArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Cache root directory
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Directory holding the cache (default: <system temp>/imgcache)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Skip the CACHEDIR.TAG backup exclusion marker
    #[arg(
        long,
        global = true,
        help = "Do not tag the cache root as excluded from backups"
    )]
    pub no_backup_tag: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve one or more URIs through the cache and print the cached paths
    Fetch(FetchArgs),
    /// Show cache location and disk usage
    Info,
    /// Remove every cached file
    Clear,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Image URI(s) to resolve
    #[arg(required = true, help = "Absolute URI(s) of the images to resolve")]
    pub uris: Vec<String>,

    /// Include the whole query string in the cache key
    #[arg(
        long,
        conflicts_with = "query_param",
        help = "Include the full query string in the cache key"
    )]
    pub query_all: bool,

    /// Query parameters whose values become part of the cache key
    #[arg(
        long = "query-param",
        value_name = "NAME",
        help = "Include the value of this query parameter in the cache key (can be used multiple times)"
    )]
    pub query_param: Vec<String>,

    /// Treat the network as unreachable
    #[arg(long, help = "Resolve from the cache only; misses are reported as deferred")]
    pub offline: bool,

    /// URL used to check reachability before fetching
    #[arg(
        long,
        value_name = "URL",
        conflicts_with = "offline",
        help = "Probe this URL with a HEAD request before fetching and defer misses if it is unreachable"
    )]
    pub probe: Option<String>,

    /// Overall request timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "all",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Show progress bars for downloads
    #[arg(
        short = 'P',
        long = "progress",
        help = "Show a progress bar while downloading"
    )]
    pub show_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let args = CliArgs::parse_from([
            "imgcache",
            "--cache-dir",
            "/tmp/c",
            "fetch",
            "https://img.example.com/a.png",
            "--query-param",
            "w",
            "--query-param",
            "h",
            "-H",
            "Referer: https://example.com",
        ]);

        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/c")));
        let Command::Fetch(fetch) = args.command else {
            panic!("expected fetch");
        };
        assert_eq!(fetch.uris, vec!["https://img.example.com/a.png"]);
        assert_eq!(fetch.query_param, vec!["w", "h"]);
        assert_eq!(fetch.headers.len(), 1);
        assert!(!fetch.query_all);
    }

    #[test]
    fn test_query_flags_conflict() {
        let result = CliArgs::try_parse_from([
            "imgcache",
            "fetch",
            "https://img.example.com/a.png",
            "--query-all",
            "--query-param",
            "w",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fetch_requires_uri() {
        assert!(CliArgs::try_parse_from(["imgcache", "fetch"]).is_err());
    }
}
