//! Configuration structs for the clapcharm demo application.
//!
//! | Config key        | Flag                | Env var              |
//! |-------------------|---------------------|----------------------|
//! | `name`            | `--name`            |                      |
//! | `workers`         | `--workers`         | `DEMO_WORKERS`       |
//! | `server.host`     | `--server.host`     | `DEMO_SERVER_HOST`   |
//! | `server.port`     | `--server.port`     | `DEMO_SERVER_PORT`   |
//! | `server.tls`      | `--server.tls`      |                      |
//! | `upstreams`       | `--upstreams`       | `DEMO_UPSTREAMS`     |
//! | `log.level`       | `--log.level`       | `DEMO_LOG_LEVEL`     |
//! | `log.labels`      | `--log.labels`      |                      |

use std::collections::BTreeMap;

use clapcharm::{FieldTags, Tagged};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct DemoConfig {
    pub name: String,
    pub workers: i64,
    pub server: ServerConfig,
    pub upstreams: Vec<String>,
    pub logging: LogConfig,
    /// Not tagged for binding; only ever holds its default.
    pub build_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogConfig {
    pub level: String,
    pub labels: BTreeMap<String, String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            name: "charm-demo".into(),
            workers: 4,
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                tls: false,
            },
            upstreams: vec!["http://127.0.0.1:9000".into()],
            logging: LogConfig {
                level: "info".into(),
                labels: BTreeMap::from([("app".to_string(), "charm-demo".to_string())]),
            },
            build_id: "dev".into(),
        }
    }
}

impl Tagged for DemoConfig {
    const TAGS: &'static [FieldTags] = &[
        FieldTags::leaf(
            "name",
            &[("mapstructure", "name"), ("usage", "Application name")],
        ),
        FieldTags::leaf(
            "workers",
            &[
                ("mapstructure", "workers"),
                ("env", "DEMO_WORKERS"),
                ("usage", "Number of worker threads"),
            ],
        ),
        FieldTags::nested::<ServerConfig>("server", &[("mapstructure", "server")]),
        FieldTags::leaf(
            "upstreams",
            &[
                ("mapstructure", "upstreams"),
                ("env", "DEMO_UPSTREAMS"),
                ("usage", "Upstream URLs, comma separated"),
            ],
        ),
        FieldTags::nested::<LogConfig>("logging", &[("mapstructure", "log")]),
        FieldTags::leaf("build_id", &[("mapstructure", "-")]),
    ];
}

impl Tagged for ServerConfig {
    const TAGS: &'static [FieldTags] = &[
        FieldTags::leaf(
            "host",
            &[
                ("mapstructure", "host"),
                ("env", "DEMO_SERVER_HOST"),
                ("usage", "Address to bind"),
            ],
        ),
        FieldTags::leaf(
            "port",
            &[
                ("mapstructure", "port"),
                ("env", "DEMO_SERVER_PORT"),
                ("usage", "Port to listen on"),
            ],
        ),
        FieldTags::leaf(
            "tls",
            &[("mapstructure", "tls"), ("usage", "Serve over TLS")],
        ),
    ];
}

impl Tagged for LogConfig {
    const TAGS: &'static [FieldTags] = &[
        FieldTags::leaf(
            "level",
            &[
                ("mapstructure", "level"),
                ("env", "DEMO_LOG_LEVEL"),
                ("usage", "Log level"),
            ],
        ),
        FieldTags::leaf(
            "labels",
            &[
                ("mapstructure", "labels"),
                ("usage", "Extra log labels as key=value pairs"),
            ],
        ),
    ];
}
