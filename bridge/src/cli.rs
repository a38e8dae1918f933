use std::path::{Path, PathBuf};

use clap::Parser;

/// Mirrors a MyAir air conditioner onto MQTT as a Homie 5 device.
#[derive(Debug, Clone, Parser)]
#[clap(version)]
pub struct Args {
    /// Path to the YAML config file
    #[clap(short = 'c', long = "conf")]
    pub config_file: PathBuf,

    /// Log at debug level
    #[clap(short, long)]
    pub debug: bool,
}

impl Args {
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "warn"
        }
    }

    pub fn config_path(&self) -> PathBuf {
        expand_home(&self.config_file, std::env::var_os("HOME").map(PathBuf::from))
    }
}

/// Replaces a leading `~` with `home`. Paths are returned unchanged when no
/// home directory is known.
pub fn expand_home(path: &Path, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = Args::try_parse_from(["myair-bridge", "-c", "myair.yaml", "-d"]).unwrap();
        assert_eq!(args.config_file, PathBuf::from("myair.yaml"));
        assert!(args.debug);
        assert_eq!(args.log_directive(), "debug");
    }

    #[test]
    fn config_file_is_required() {
        assert!(Args::try_parse_from(["myair-bridge", "--debug"]).is_err());

        let args = Args::try_parse_from(["myair-bridge", "--conf", "/etc/myair.yaml"]).unwrap();
        assert!(!args.debug);
        assert_eq!(args.log_directive(), "warn");
    }

    #[test]
    fn expands_leading_tilde() {
        let home = Some(PathBuf::from("/home/pi"));
        assert_eq!(
            expand_home(Path::new("~/myair/config.yaml"), home.clone()),
            PathBuf::from("/home/pi/myair/config.yaml")
        );
        assert_eq!(
            expand_home(Path::new("/etc/myair.yaml"), home),
            PathBuf::from("/etc/myair.yaml")
        );
        assert_eq!(
            expand_home(Path::new("~/config.yaml"), None),
            PathBuf::from("~/config.yaml")
        );
    }
}
