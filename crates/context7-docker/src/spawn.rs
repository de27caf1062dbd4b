//! The command line the host uses to launch the server container.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{WrapperConfig, TRANSPORT};

pub const CONTAINER_RUNTIME: &str = "docker";

/// A fully-formed `docker run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Inputs for the spawn line, kept separately so builder tweaks re-render cleanly.
#[derive(Debug, Clone)]
struct SpawnParts {
    container_name: Option<String>,
    memory: String,
    cpus: String,
    network: Option<String>,
    mount: Option<(String, String)>,
    image: String,
    entry_args: Vec<String>,
}

impl SpawnCommand {
    /// Build the spawn command for the configured image and limits.
    ///
    /// The secret mount is included only when the host file exists.
    pub fn for_config(config: &WrapperConfig) -> Self {
        let mount = config.secret.is_present().then(|| {
            (
                config.secret.host_path.display().to_string(),
                config.secret.container_path.clone(),
            )
        });

        SpawnParts {
            container_name: Some(config.container_name.clone()),
            memory: config.limits.memory.clone(),
            cpus: config.limits.cpus.clone(),
            network: None,
            mount,
            image: config.image.to_string(),
            entry_args: vec!["--transport".to_string(), TRANSPORT.to_string()],
        }
        .render()
    }

    pub fn with_container_name(self, name: impl Into<String>) -> Self {
        self.rebuild(|parts| parts.container_name = Some(name.into()))
    }

    pub fn with_network(self, network: impl Into<String>) -> Self {
        self.rebuild(|parts| parts.network = Some(network.into()))
    }

    /// Replace the arguments passed to the server after the image reference.
    pub fn with_entry_args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        self.rebuild(|parts| parts.entry_args = args)
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Image reference (the first positional argument after the flags).
    pub fn image(&self) -> Option<&str> {
        self.parts().map(|p| p.image).and_then(|image| {
            self.args
                .iter()
                .find(|a| **a == image)
                .map(String::as_str)
        })
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    fn rebuild(self, edit: impl FnOnce(&mut SpawnParts)) -> Self {
        match self.parts() {
            Some(mut parts) => {
                edit(&mut parts);
                parts.render()
            }
            None => self,
        }
    }

    /// Recover the structured parts from a rendered `docker run` line.
    fn parts(&self) -> Option<SpawnParts> {
        let mut iter = self.args.iter();
        if iter.next().map(String::as_str) != Some("run") {
            return None;
        }

        let mut parts = SpawnParts {
            container_name: None,
            memory: String::new(),
            cpus: String::new(),
            network: None,
            mount: None,
            image: String::new(),
            entry_args: Vec::new(),
        };

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-i" | "--rm" => {}
                "--name" => parts.container_name = iter.next().cloned(),
                "--memory" => parts.memory = iter.next().cloned()?,
                "--cpus" => parts.cpus = iter.next().cloned()?,
                "--network" => parts.network = iter.next().cloned(),
                "-v" => {
                    let spec = iter.next()?.as_str();
                    let spec = spec.strip_suffix(":ro").unwrap_or(spec);
                    let (host, container) = spec.rsplit_once(':')?;
                    parts.mount = Some((host.to_string(), container.to_string()));
                }
                image => {
                    parts.image = image.to_string();
                    parts.entry_args = iter.by_ref().cloned().collect();
                    break;
                }
            }
        }

        Some(parts)
    }
}

impl SpawnParts {
    fn render(self) -> SpawnCommand {
        let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];

        if let Some(name) = self.container_name {
            args.push("--name".to_string());
            args.push(name);
        }
        args.push("--memory".to_string());
        args.push(self.memory);
        args.push("--cpus".to_string());
        args.push(self.cpus);
        if let Some(network) = self.network {
            args.push("--network".to_string());
            args.push(network);
        }
        if let Some((host, container)) = self.mount {
            args.push("-v".to_string());
            args.push(format!("{host}:{container}:ro"));
        }
        args.push(self.image);
        args.extend(self.entry_args);

        SpawnCommand {
            program: CONTAINER_RUNTIME.to_string(),
            args,
        }
    }
}

impl fmt::Display for SpawnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line: Vec<String> = self.argv().iter().map(|a| shell_quote(a)).collect();
        f.write_str(&line.join(" "))
    }
}

/// Quote an argument for display in a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretMount;

    fn config_without_secret() -> WrapperConfig {
        WrapperConfig {
            secret: SecretMount::new("/nonexistent/context7/api_key"),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_spawn_line() {
        let spawn = SpawnCommand::for_config(&config_without_secret());
        assert_eq!(
            spawn.to_string(),
            "docker run -i --rm --name context7-mcp --memory 2g --cpus 1 context7-mcp:latest --transport stdio"
        );
        assert_eq!(spawn.flag_value("--memory"), Some("2g"));
        assert_eq!(spawn.flag_value("--cpus"), Some("1"));
        assert!(spawn.has_flag("-i"));
        assert!(spawn.has_flag("--rm"));
        assert_eq!(spawn.image(), Some("context7-mcp:latest"));
    }

    #[test]
    fn test_secret_mount_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        let config = WrapperConfig {
            secret: SecretMount::new(&path),
            ..Default::default()
        };

        assert!(!SpawnCommand::for_config(&config).has_flag("-v"));

        std::fs::write(&path, "secret").unwrap();
        let spawn = SpawnCommand::for_config(&config);
        let expected = format!("{}:/run/secrets/context7_api_key:ro", path.display());
        assert_eq!(spawn.flag_value("-v"), Some(expected.as_str()));
    }

    #[test]
    fn test_builder_tweaks_keep_limits() {
        let spawn = SpawnCommand::for_config(&config_without_secret())
            .with_container_name("context7-probe-1")
            .with_network("none")
            .with_entry_args(["--help"]);

        assert_eq!(spawn.flag_value("--name"), Some("context7-probe-1"));
        assert_eq!(spawn.flag_value("--network"), Some("none"));
        assert_eq!(spawn.flag_value("--memory"), Some("2g"));
        assert_eq!(spawn.args.last().map(String::as_str), Some("--help"));
        assert_eq!(spawn.image(), Some("context7-mcp:latest"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("--memory"), "--memory");
        assert_eq!(shell_quote("/home/a b/key"), "'/home/a b/key'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
