use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::path::Path;

use clap::{ArgMatches, Command};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bind;
use crate::decode::{self, DecoderConfig, DecoderOption};
use crate::error::CharmError;
use crate::file::{self, Classified};
use crate::resolve::{Layer, ResolveInput};
use crate::settings::Settings;
use crate::tags::{self, TagNames, Tagged};
use crate::tree::{self, Node};
use crate::types::{ConfigFormat, FieldDescriptor};

/// Format assumed for a config file with no or an unknown extension.
pub const DEFAULT_CONFIG_FILE_TYPE: &str = "yaml";
/// Base name searched for when the config path is a directory.
pub const DEFAULT_CONFIG_BASE_NAME: &str = "config";

/// The resolution engine for one tagged config struct `T`.
///
/// Built once with [`Charmer::builder`], bound once with
/// [`add_flags`](Self::add_flags), then resolved as often as needed.
pub struct Charmer<T> {
    tree: Node,
    tag_names: TagNames,
    config_file_type: ConfigFormat,
    config_file_path: String,
    config_file_base_name: String,
    ignore_untagged_fields: bool,
    decoder_options: Vec<DecoderOption>,
    command: Command,
    settings: Settings,
    fields: Vec<FieldDescriptor>,
    flags_added: bool,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Charmer<T>
where
    T: Tagged + Serialize + DeserializeOwned,
{
    pub fn builder() -> CharmerBuilder<T> {
        CharmerBuilder::new()
    }

    pub fn field_tag_name(&self) -> &str {
        &self.tag_names.field
    }

    pub fn env_tag_name(&self) -> &str {
        &self.tag_names.env
    }

    pub fn help_tag_name(&self) -> &str {
        &self.tag_names.help
    }

    pub fn config_file_type(&self) -> ConfigFormat {
        self.config_file_type
    }

    pub fn config_file_path(&self) -> &str {
        &self.config_file_path
    }

    pub fn config_file_base_name(&self) -> &str {
        &self.config_file_base_name
    }

    pub fn ignore_untagged_fields(&self) -> bool {
        self.ignore_untagged_fields
    }

    /// Point at a config file or directory after construction, typically
    /// from a `--config` flag the caller defined on the command. An empty
    /// path disables the config file.
    pub fn set_config_file_path(&mut self, path: impl AsRef<str>) {
        self.config_file_path = path.as_ref().trim().to_string();
    }

    /// Change the format assumed for files with no or an unknown extension.
    pub fn set_config_file_type(&mut self, config_type: &str) -> Result<(), CharmError> {
        self.config_file_type = parse_config_type(config_type)?;
        Ok(())
    }

    /// Change the file name searched for when the config path is a directory.
    pub fn set_config_file_base_name(&mut self, name: &str) -> Result<(), CharmError> {
        self.config_file_base_name = validate_base_name(name)?;
        Ok(())
    }

    /// Change the key tag. Only possible before [`add_flags`](Self::add_flags).
    pub fn set_field_tag_name(&mut self, name: &str) -> Result<(), CharmError> {
        self.ensure_unbound()?;
        self.tag_names.field = tags::validate_tag_name("field", name)?;
        Ok(())
    }

    /// Change the env tag. Only possible before [`add_flags`](Self::add_flags).
    pub fn set_env_tag_name(&mut self, name: &str) -> Result<(), CharmError> {
        self.ensure_unbound()?;
        self.tag_names.env = tags::validate_tag_name("env", name)?;
        Ok(())
    }

    /// Change the help tag. Only possible before [`add_flags`](Self::add_flags).
    pub fn set_help_tag_name(&mut self, name: &str) -> Result<(), CharmError> {
        self.ensure_unbound()?;
        self.tag_names.help = tags::validate_tag_name("help", name)?;
        Ok(())
    }

    /// Append a decoder customization, applied after the existing ones.
    pub fn add_decoder_config_option<F>(&mut self, option: F)
    where
        F: Fn(&mut DecoderConfig) + Send + Sync + 'static,
    {
        self.decoder_options.push(Box::new(option));
    }

    /// Toggle tolerance of untagged fields. Binding honours it only before
    /// [`add_flags`](Self::add_flags); decoding honours it on every resolve.
    pub fn set_ignore_untagged_fields(&mut self, ignore: bool) {
        self.ignore_untagged_fields = ignore;
        self.add_decoder_config_option(move |c| c.ignore_untagged_fields = ignore);
    }

    fn ensure_unbound(&self) -> Result<(), CharmError> {
        if self.flags_added {
            return Err(CharmError::FlagsAlreadyAdded);
        }
        Ok(())
    }

    /// Add one flag per leaf field to the command and register defaults and
    /// env bindings.
    ///
    /// Every schema problem is collected into a single
    /// [`CharmError::Schema`]; on error nothing is registered. May only
    /// succeed once.
    pub fn add_flags(&mut self) -> Result<(), CharmError> {
        if self.flags_added {
            return Err(CharmError::FlagsAlreadyAdded);
        }
        let command = std::mem::take(&mut self.command);
        match bind::synthesize(
            &self.tree,
            T::TAGS,
            &self.tag_names,
            self.ignore_untagged_fields,
            command,
            &mut self.settings,
        ) {
            Ok((command, fields)) => {
                debug!(count = fields.len(), "flags added");
                self.command = command;
                self.fields = fields;
                self.flags_added = true;
                Ok(())
            }
            Err((command, errors)) => {
                self.command = command;
                Err(CharmError::Schema(errors))
            }
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Mutable access, e.g. for `try_get_matches_from_mut`.
    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    pub fn into_command(self) -> Command {
        self.command
    }

    /// Every bound field and section, in declaration order. Empty until
    /// [`add_flags`](Self::add_flags) succeeds.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Winning layer of every bound key for `matches` and the process
    /// environment, against the config file read by the last resolve.
    pub fn sources(&self, matches: &ArgMatches) -> Result<BTreeMap<String, Layer>, CharmError> {
        let vars = self.bound_env_vars();
        let input = ResolveInput {
            matches: Some(matches),
            env_vars: &vars,
        };
        Ok(self.settings.resolve(&input)?.sources)
    }

    /// The config file merged by the last resolve, if any.
    pub fn config_file_used(&self) -> Option<&Path> {
        self.settings.config_file_used()
    }

    /// The decoder configuration the next resolve will use.
    pub fn decoder_config(&self) -> DecoderConfig {
        decode::decoder_config(&self.decoder_options, &self.tag_names.field)
    }

    /// Resolve against parsed flags and the process environment.
    ///
    /// Only variables named by env tags are read.
    pub fn resolve(&mut self, matches: &ArgMatches) -> Result<T, CharmError> {
        let vars = self.bound_env_vars();
        self.resolve_from(Some(matches), &vars)
    }

    /// Resolve against explicit inputs. `None` resolves as if no flags were
    /// passed.
    ///
    /// Loads the config file (if a path is set), reconciles all layers and
    /// strictly decodes a fresh `T`. Repeatable: the file layer is replaced,
    /// never accumulated.
    pub fn resolve_from(
        &mut self,
        matches: Option<&ArgMatches>,
        env_vars: &HashMap<String, String>,
    ) -> Result<T, CharmError> {
        if !self.flags_added {
            return Err(CharmError::FlagsNotAdded);
        }
        self.load_config_file()?;

        let input = ResolveInput { matches, env_vars };
        let resolved = self.settings.resolve(&input)?;
        let decoder = self.decoder_config();
        debug!(tag = %decoder.tag_name, weak = decoder.weakly_typed_input, "decoding settings");
        decode::decode(
            &self.tree,
            T::TAGS,
            &resolved.table,
            &resolved.sources,
            &decoder,
        )
    }

    fn load_config_file(&mut self) -> Result<(), CharmError> {
        self.settings.clear_config();
        if self.config_file_path.trim().is_empty() {
            debug!("no config file path set, skipping config file");
            return Ok(());
        }

        match file::classify(&self.config_file_path)? {
            Classified::Directory(dir) => {
                self.settings
                    .search_config_in(dir, &self.config_file_base_name);
            }
            Classified::File {
                path,
                inferred: Some(_),
            } => self.settings.set_config_file(path),
            Classified::File {
                path,
                inferred: None,
            } => {
                self.settings.set_config_file(path);
                self.settings.set_config_type(self.config_file_type);
            }
        }
        self.settings.read_in_config()
    }

    /// Current values of the env vars named by env tags. Unset ones are
    /// left out.
    pub fn bound_env_vars(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .filter_map(|f| f.env.as_deref())
            .filter_map(|name| Some((name.to_string(), std::env::var(name).ok()?)))
            .collect()
    }
}

fn validate_base_name(raw: &str) -> Result<String, CharmError> {
    let name = raw.trim();
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(CharmError::InvalidConfigBaseName(raw.to_string()));
    }
    Ok(name.to_string())
}

fn parse_config_type(raw: &str) -> Result<ConfigFormat, CharmError> {
    ConfigFormat::from_extension(raw).ok_or_else(|| CharmError::UnsupportedConfigType(raw.to_string()))
}

/// Builder for a [`Charmer`]. `defaults` and `command` are required.
pub struct CharmerBuilder<T> {
    defaults: Option<T>,
    command: Option<Command>,
    field_tag_name: String,
    env_tag_name: String,
    help_tag_name: String,
    config_file_type: String,
    config_file_path: String,
    config_file_base_name: String,
    ignore_untagged_fields: bool,
    decoder_options: Vec<DecoderOption>,
    settings: Option<Settings>,
}

impl<T> CharmerBuilder<T>
where
    T: Tagged + Serialize + DeserializeOwned,
{
    fn new() -> Self {
        let names = TagNames::default();
        Self {
            defaults: None,
            command: None,
            field_tag_name: names.field,
            env_tag_name: names.env,
            help_tag_name: names.help,
            config_file_type: DEFAULT_CONFIG_FILE_TYPE.to_string(),
            config_file_path: String::new(),
            config_file_base_name: DEFAULT_CONFIG_BASE_NAME.to_string(),
            ignore_untagged_fields: false,
            decoder_options: Vec::new(),
            settings: None,
        }
    }

    /// The defaults value. Every bound field's current value becomes its
    /// default; the value itself is not modified by resolution.
    pub fn defaults(mut self, defaults: T) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// The command flags are added to.
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Tag holding the settings key (default `"mapstructure"`).
    pub fn field_tag_name(mut self, name: &str) -> Self {
        self.field_tag_name = name.to_string();
        self
    }

    /// Tag holding the env var name (default `"env"`).
    pub fn env_tag_name(mut self, name: &str) -> Self {
        self.env_tag_name = name.to_string();
        self
    }

    /// Tag holding flag help text (default `"usage"`).
    pub fn help_tag_name(mut self, name: &str) -> Self {
        self.help_tag_name = name.to_string();
        self
    }

    /// Format for config files with no or an unknown extension (default
    /// `"yaml"`).
    pub fn config_file_type(mut self, config_type: &str) -> Self {
        self.config_file_type = config_type.to_string();
        self
    }

    /// Config file or directory. Empty (the default) means no config file.
    pub fn config_file_path(mut self, path: &str) -> Self {
        self.config_file_path = path.trim().to_string();
        self
    }

    /// File name searched for, without extension, when the config path is a
    /// directory (default `"config"`).
    pub fn config_file_base_name(mut self, name: &str) -> Self {
        self.config_file_base_name = name.to_string();
        self
    }

    /// Append a decoder customization. Applied in the order added.
    pub fn decoder_config_option<F>(mut self, option: F) -> Self
    where
        F: Fn(&mut DecoderConfig) + Send + Sync + 'static,
    {
        self.decoder_options.push(Box::new(option));
        self
    }

    /// Use a pre-populated settings store instead of an empty one, e.g. one
    /// already pointed at a config file. Binding adds to it.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Skip fields without a key tag instead of failing (default `false`).
    /// The decoder then leaves them at their defaults too.
    pub fn ignore_untagged_fields(mut self, ignore: bool) -> Self {
        self.ignore_untagged_fields = ignore;
        self
    }

    pub fn build(self) -> Result<Charmer<T>, CharmError> {
        let defaults = self.defaults.ok_or(CharmError::DefaultsRequired)?;
        let command = self.command.ok_or(CharmError::CommandRequired)?;

        let tag_names = TagNames {
            field: tags::validate_tag_name("field", &self.field_tag_name)?,
            env: tags::validate_tag_name("env", &self.env_tag_name)?,
            help: tags::validate_tag_name("help", &self.help_tag_name)?,
        };
        let config_file_type = parse_config_type(&self.config_file_type)?;
        let base_name = validate_base_name(&self.config_file_base_name)?;

        let tree = tree::to_tree(&defaults).map_err(|e| CharmError::Introspection(e.to_string()))?;
        if !matches!(tree, Node::Struct(_)) {
            return Err(CharmError::NotAStruct {
                found: tree.describe(),
            });
        }

        let mut decoder_options = self.decoder_options;
        if self.ignore_untagged_fields {
            decoder_options.push(Box::new(|c: &mut DecoderConfig| {
                c.ignore_untagged_fields = true;
            }));
        }

        Ok(Charmer {
            tree,
            tag_names,
            config_file_type,
            config_file_path: self.config_file_path,
            config_file_base_name: base_name,
            ignore_untagged_fields: self.ignore_untagged_fields,
            decoder_options,
            command,
            settings: self.settings.unwrap_or_default(),
            fields: Vec::new(),
            flags_added: false,
            _phantom: PhantomData,
        })
    }
}
