use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Runtime settings. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "todo-api", version, about = "JSON API for managing todo items")]
pub struct Config {
    /// SQLite database file (`:memory:` for a throwaway store)
    #[arg(long, env = "TODO_DATABASE", default_value = "todo.db")]
    pub database: PathBuf,

    /// Address the HTTP server binds to
    #[arg(long, env = "TODO_LISTEN", default_value = "0.0.0.0:5876")]
    pub listen: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "todo-api",
            "--database",
            "/tmp/todos.db",
            "--listen",
            "127.0.0.1:8080",
        ])
        .unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/todos.db"));
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Config::try_parse_from(["todo-api", "--listen", "nowhere"]).is_err());
    }
}
