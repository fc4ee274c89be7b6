use std::path::PathBuf;

use clap::Parser;
use face_fetch::ConfigLayer;

#[derive(Debug, Parser)]
#[command(
    name = "face-fetch",
    version,
    about = "Download a captured face picture from an access terminal"
)]
pub struct Cli {
    /// JSON config file. Defaults to <config dir>/face-fetch/config.json when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Device host or IP, optionally with a port.
    #[arg(long, env = "FACE_FETCH_HOST")]
    pub host: Option<String>,

    #[arg(long, short = 'u', env = "FACE_FETCH_USERNAME")]
    pub username: Option<String>,

    #[arg(long, short = 'p', env = "FACE_FETCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Picture path on the device, or the full picture URL from an access event.
    #[arg(long, env = "FACE_FETCH_PATH")]
    pub path: Option<String>,

    /// Seconds allowed for the whole request, challenge round trip included.
    #[arg(long, env = "FACE_FETCH_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Output file, overwritten on success.
    #[arg(long, short = 'o', env = "FACE_FETCH_OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Flags and environment variables as one configuration layer.
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            resource_path: self.path.clone(),
            timeout_secs: self.timeout,
            output: self.output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_layer() {
        let cli = Cli::parse_from([
            "face-fetch",
            "--host",
            "192.168.1.10",
            "-u",
            "admin",
            "--path",
            "/LOCALS/pic/acsLinkCap/202601_00/07_051227_30075_0.jpeg",
            "--timeout",
            "5",
            "-o",
            "out.jpg",
        ]);

        let layer = cli.layer();
        assert_eq!(layer.host.as_deref(), Some("192.168.1.10"));
        assert_eq!(layer.username.as_deref(), Some("admin"));
        assert_eq!(layer.timeout_secs, Some(5));
        assert_eq!(layer.output, Some(PathBuf::from("out.jpg")));
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
