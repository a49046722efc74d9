#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::tags::{FieldTags, Tagged};

    /// Key tag name used by [`TestConfig`], deliberately not the default.
    pub const TEST_TAG: &str = "charm";

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TestConfig {
        pub workers: i64,
        pub max_burst: f64,
        pub bind_addr: String,
        pub upstreams: Vec<String>,
        pub logging: TestLogging,
        pub ignore_me: bool,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TestLogging {
        pub level: String,
        pub json: bool,
        pub limit: TestLimits,
        pub destinations: BTreeMap<String, String>,
        pub ignore_me: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TestLimits {
        pub warn: u32,
        pub error: u32,
        pub ignore_me: i32,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                workers: 128,
                max_burst: 1.25,
                bind_addr: "0.0.0.0".into(),
                upstreams: vec!["http://127.0.0.1:8081/".into()],
                logging: TestLogging {
                    level: "info".into(),
                    json: false,
                    limit: TestLimits {
                        warn: 100,
                        error: 100,
                        ignore_me: 7,
                    },
                    destinations: BTreeMap::from([(
                        "error".to_string(),
                        "/var/log/test/error.log".to_string(),
                    )]),
                    ignore_me: "untouched".into(),
                },
                ignore_me: true,
            }
        }
    }

    impl Tagged for TestConfig {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf(
                "workers",
                &[
                    (TEST_TAG, "workers"),
                    ("env", "TEST_WORKERS"),
                    ("usage", "Number of workers to run"),
                ],
            ),
            FieldTags::leaf(
                "max_burst",
                &[
                    (TEST_TAG, "max-burst,omitempty"),
                    ("env", "TEST_MAX_BURST"),
                    ("usage", "Burst multiplier"),
                ],
            ),
            FieldTags::leaf(
                "bind_addr",
                &[
                    (TEST_TAG, "bind-addr"),
                    ("env", "TEST_BIND_ADDR"),
                    ("usage", "Address to listen on"),
                ],
            ),
            FieldTags::leaf(
                "upstreams",
                &[(TEST_TAG, "upstreams"), ("usage", "Upstream servers")],
            ),
            FieldTags::nested::<TestLogging>("logging", &[(TEST_TAG, "log")]),
        ];
    }

    impl Tagged for TestLogging {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf(
                "level",
                &[
                    (TEST_TAG, "level"),
                    ("env", "TEST_LOG_LEVEL"),
                    ("usage", "Log level"),
                ],
            ),
            FieldTags::leaf(
                "json",
                &[
                    (TEST_TAG, "json"),
                    ("env", "TEST_LOG_JSON"),
                    ("usage", "Log as JSON"),
                ],
            ),
            FieldTags::nested::<TestLimits>("limit", &[(TEST_TAG, "limit")]),
            FieldTags::leaf(
                "destinations",
                &[(TEST_TAG, "dst"), ("usage", "Log destinations by level")],
            ),
        ];
    }

    impl Tagged for TestLimits {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf(
                "warn",
                &[(TEST_TAG, "warn"), ("usage", "Warnings per minute")],
            ),
            FieldTags::leaf(
                "error",
                &[(TEST_TAG, "error"), ("usage", "Errors per minute")],
            ),
        ];
    }

    /// Small struct using the default tag names.
    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct ServerConfig {
        pub host: String,
        pub port: u16,
        pub debug: bool,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                host: "localhost".into(),
                port: 8080,
                debug: false,
            }
        }
    }

    impl Tagged for ServerConfig {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf(
                "host",
                &[("mapstructure", "host"), ("usage", "Host to bind")],
            ),
            FieldTags::leaf(
                "port",
                &[
                    ("mapstructure", "port"),
                    ("env", "SERVER_PORT"),
                    ("usage", "Port to bind"),
                ],
            ),
            FieldTags::leaf(
                "debug",
                &[
                    ("mapstructure", "debug"),
                    ("env", "SERVER_DEBUG"),
                    ("usage", "Enable debug mode"),
                ],
            ),
        ];
    }

    #[test]
    fn fixture_tags_name_real_fields() {
        let value = serde_json::to_value(TestConfig::default()).unwrap();
        for tags in TestConfig::TAGS {
            assert!(value.get(tags.field).is_some(), "{}", tags.field);
        }
        for tags in TestLogging::TAGS {
            assert!(value["logging"].get(tags.field).is_some(), "{}", tags.field);
        }
    }
}
