//! Declarative config resolution for clap applications. Tag a struct, hand
//! over its defaults, and get flags, env vars and a config file for free.
//!
//! clapcharm derives one command-line flag per leaf field of a tagged struct,
//! binds each one to an environment variable, merges an optional config file,
//! and decodes one authoritative value per field:
//!
//! ```ignore
//! let mut charmer = Charmer::builder()
//!     .defaults(ServerConfig::default())
//!     .command(Command::new("server"))
//!     .build()?;
//! charmer.add_flags()?;
//! let matches = charmer.command_mut().get_matches_mut();
//! let config: ServerConfig = charmer.resolve(&matches)?;
//! ```
//!
//! # Tags
//!
//! A struct opts in by implementing [`Tagged`]: a constant table of
//! `(tag name, value)` pairs per field, in the spirit of struct tags.
//!
//! ```ignore
//! impl Tagged for ServerConfig {
//!     const TAGS: &'static [FieldTags] = &[
//!         FieldTags::leaf("workers", &[
//!             ("mapstructure", "workers"),
//!             ("env", "SERVER_WORKERS"),
//!             ("usage", "Number of workers to run"),
//!         ]),
//!         FieldTags::nested::<LogConfig>("logging", &[("mapstructure", "log")]),
//!     ];
//! }
//! ```
//!
//! - the **key tag** (default `mapstructure`) names the settings key. Anything
//!   after the first comma (`"workers,omitempty"`) is ignored. `"-"` excludes
//!   the field.
//! - the **env tag** (default `env`) names an environment variable. Optional.
//! - the **help tag** (default `usage`) is the flag's help text. Required on
//!   every bound leaf.
//!
//! All three tag names are configurable on the builder.
//!
//! # Defaults are values, not annotations
//!
//! There is no default syntax. The value passed to
//! [`defaults()`](CharmerBuilder::defaults) *is* the default: it is
//! serialized once at build time and every leaf's current value becomes the
//! flag's shown default and the lowest settings layer. That value is never
//! written to; [`resolve`](Charmer::resolve) returns a fresh `T`.
//!
//! Because types are inferred from values, sequence and map defaults must be
//! non-empty, and `Option` fields must be `Some`.
//!
//! # Supported fields
//!
//! | Rust type | Flag |
//! |-----------|------|
//! | `bool` | `--key`, `--key=false` |
//! | signed integers | `--key=-3` |
//! | unsigned integers | `--key=3` |
//! | `f32`, `f64` | `--key=1.5` |
//! | `String`, unit enums | `--key=text` |
//! | `Vec<String>` | `--key=a,b` or repeated |
//! | `HashMap`/`BTreeMap<String, String>` | `--key=k=v,k2=v2` or repeated |
//! | tagged struct | no flag; its leaves get `parent.child` keys |
//!
//! Anything else is a schema error.
//!
//! # Layer precedence
//!
//! ```text
//! Compiled defaults     the value given to .defaults()
//!        ↑ overridden by
//! Config file           .config_file_path() / set_config_file_path()
//!        ↑ overridden by
//! Environment vars      the field's env tag
//!        ↑ overridden by
//! Flags                 only when passed on the command line
//! ```
//!
//! Every layer is sparse and applies per leaf key, at any nesting depth. A
//! flag's own default never shadows an env var: only a value the user typed
//! counts.
//!
//! # Config file
//!
//! The config path may be:
//!
//! - **empty** (the default): no config file.
//! - **a directory**: searched for `config.json`, `config.toml`,
//!   `config.yaml`, `config.yml` in that order (base name configurable).
//! - **a file with a known extension**: parsed as that format.
//! - **a file with no or an unknown extension**: parsed as the configured
//!   file type (default `yaml`).
//!
//! A path that does not exist is an error, not a silent skip. To make the
//! file optional, pass an empty path.
//!
//! # Strict decoding
//!
//! Every key in the merged settings must land in a struct field. A stray
//! `wokers = 4` in a config file fails resolution with
//! [`CharmError::UnknownFields`], listing every stray key at once. The
//! decoder can be tuned with
//! [`decoder_config_option()`](CharmerBuilder::decoder_config_option).
//!
//! # Error handling
//!
//! All fallible operations return [`CharmError`]. Schema mistakes are
//! collected by [`add_flags()`](Charmer::add_flags) into a single
//! [`CharmError::Schema`] so they can be fixed in one pass. Enable the
//! `rich-errors` feature for `miette` diagnostics.
//!
//! # Logging
//!
//! The crate emits `tracing` events (binding at `debug`, per-key layer
//! decisions at `trace`, merged config files at `info`) and never installs a
//! subscriber.

pub mod error;
pub mod types;

mod bind;
mod builder;
mod decode;
mod env;
mod file;
pub(crate) mod merge;
mod resolve;
mod settings;
mod tags;
mod tree;
mod walk;

#[cfg(test)]
mod fixtures;

pub use builder::{Charmer, CharmerBuilder, DEFAULT_CONFIG_BASE_NAME, DEFAULT_CONFIG_FILE_TYPE};
pub use decode::{DecoderConfig, DecoderOption};
pub use error::{CharmError, SchemaError};
pub use resolve::{Layer, ResolveInput, Resolved};
pub use settings::Settings;
pub use tags::{DEFAULT_ENV_TAG, DEFAULT_FIELD_TAG, DEFAULT_HELP_TAG, FieldTags, TagNames, Tagged};
pub use types::{ConfigFormat, FieldDescriptor, FieldKind};
