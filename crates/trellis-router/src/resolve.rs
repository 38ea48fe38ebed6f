//! Command and shortcut resolution.
//!
//! Turns free-form message text into a [`ParsedCommandLine`] against the
//! registered command table, falling back to shortcut matching and, on
//! total failure in a context that demanded resolution, to fuzzy
//! suggestions. Marker stripping (at-mention, nickname, prefix) happens
//! first and its outcome drives which stages run.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace};

use trellis_core::{MessageEvent, UserRecord};

use crate::context::Context;
use crate::error::RouterResult;
use crate::router::RouterConfig;

// ============================================================================
// Command table
// ============================================================================

/// Everything a command handler gets to work with.
pub struct CommandInvocation {
    /// The originating event.
    pub event: MessageEvent,
    /// Positional arguments after the command name.
    pub args: Vec<String>,
    /// `--key=value` options, with shortcut defaults merged in.
    pub options: HashMap<String, String>,
    /// The user record observed for this dispatch, if a store is
    /// configured.
    pub record: Option<UserRecord>,
}

/// The async function a command executes.
pub type CommandHandler =
    Arc<dyn Fn(CommandInvocation) -> BoxFuture<'static, RouterResult<Option<String>>> + Send + Sync>;

/// Wraps an async closure into a [`CommandHandler`].
///
/// Returning `Ok(Some(text))` sends `text` as the reply.
pub fn command_fn<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RouterResult<Option<String>>> + Send + 'static,
{
    Arc::new(
        move |inv: CommandInvocation| -> BoxFuture<'static, RouterResult<Option<String>>> {
            Box::pin(f(inv))
        },
    )
}

/// A registered command: name, aliases, argument expectations, required
/// user-state fields, minimum authority, and the handler.
pub struct CommandSpec {
    /// Primary name, lowercase.
    pub name: String,
    /// Alternative names, lowercase.
    pub aliases: Vec<String>,
    /// One-line usage string for help output.
    pub usage: String,
    /// User-record fields this command needs loaded before execution.
    pub required_fields: Vec<String>,
    /// Minimum authority level of the caller.
    pub authority: u8,
    /// The handler to run.
    pub handler: CommandHandler,
}

impl CommandSpec {
    /// Creates a spec with defaults: no aliases, no extra fields,
    /// authority 0.
    pub fn new(name: impl Into<String>, handler: CommandHandler) -> Self {
        Self {
            name: name.into().to_lowercase(),
            aliases: Vec::new(),
            usage: String::new(),
            required_fields: Vec::new(),
            authority: 0,
            handler,
        }
    }

    /// Adds an alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    /// Sets the usage line.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Declares a user-record field this command needs.
    pub fn require_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    /// Sets the minimum caller authority.
    pub fn authority(mut self, level: u8) -> Self {
        self.authority = level;
        self
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

/// A command spec bound to the context it was registered under.
///
/// The context defines where the command is callable.
#[derive(Clone)]
pub struct RegisteredCommand {
    /// The command definition.
    pub spec: Arc<CommandSpec>,
    /// Where it is callable.
    pub context: Arc<Context>,
}

/// Append-only table of registered commands.
pub struct CommandTable {
    entries: RwLock<Vec<RegisteredCommand>>,
}

impl CommandTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, spec: Arc<CommandSpec>, context: Arc<Context>) {
        debug!(command = %spec.name, scope = %context.key(), "registering command");
        self.entries.write().push(RegisteredCommand { spec, context });
    }

    /// Looks up a command by name or alias, scoped to the event.
    ///
    /// Returns the first registration (in registration order) whose
    /// context matches the event.
    pub(crate) fn lookup(&self, token: &str, event: &MessageEvent) -> Option<RegisteredCommand> {
        let token = token.to_lowercase();
        self.entries
            .read()
            .iter()
            .find(|entry| {
                (entry.spec.name == token || entry.spec.aliases.iter().any(|a| *a == token))
                    && entry.context.matches(event)
            })
            .cloned()
    }

    /// All primary command names, for suggestion scoring.
    pub(crate) fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.spec.name.clone())
            .collect()
    }
}

// ============================================================================
// Shortcuts
// ============================================================================

/// A pre-registered free-text trigger resolving directly to a command.
#[derive(Clone, Debug)]
pub struct ShortcutRule {
    /// The trigger token.
    pub token: String,
    /// Name of the owning command.
    pub command: String,
    /// Match on `starts_with` instead of requiring the token to be the
    /// whole first word.
    pub fuzzy: bool,
    /// Only consider this shortcut when the message carried a nickname
    /// or mention (an "addressed" context).
    pub prefix_required: bool,
    /// Treat the entire remainder as one argument instead of splitting.
    pub single_arg: bool,
    /// Option defaults merged into any match (explicit options win).
    pub defaults: Vec<(String, String)>,
}

impl ShortcutRule {
    /// Creates an exact-match shortcut with no flags set.
    pub fn new(token: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            command: command.into().to_lowercase(),
            fuzzy: false,
            prefix_required: false,
            single_arg: false,
            defaults: Vec::new(),
        }
    }

    /// Enables fuzzy (prefix-of-text) matching.
    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    /// Requires an addressed context (nickname or mention).
    pub fn prefix_required(mut self) -> Self {
        self.prefix_required = true;
        self
    }

    /// Passes the whole remainder as a single argument.
    pub fn single_arg(mut self) -> Self {
        self.single_arg = true;
        self
    }

    /// Adds a default option value.
    pub fn default_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// Parsed command line
// ============================================================================

/// A resolved command plus parsed arguments, built per dispatch attempt
/// and discarded after execution.
#[derive(Clone)]
pub struct ParsedCommandLine {
    /// The command to execute.
    pub command: RegisteredCommand,
    /// Positional arguments.
    pub args: Vec<String>,
    /// `--key=value` options, including merged shortcut defaults.
    pub options: HashMap<String, String>,
}

impl std::fmt::Debug for ParsedCommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCommandLine")
            .field("command", &self.command.spec.name)
            .field("args", &self.args)
            .field("options", &self.options)
            .finish()
    }
}

/// A best-guess command offered when resolution failed.
#[derive(Clone, Debug)]
pub struct Suggestion {
    /// The suggested command name.
    pub name: String,
    /// The stripped text the user sent, for reparse on accept.
    pub original: String,
    /// Similarity score that won.
    pub score: f64,
}

/// Outcome of one resolution attempt.
pub(crate) enum Resolution {
    /// A command parsed strictly or via shortcut.
    Command(ParsedCommandLine),
    /// Nothing parsed but a close-enough command name exists.
    Suggest(Suggestion),
    /// Nothing to do; the event falls through to remaining middleware.
    None,
}

// ============================================================================
// Marker stripping
// ============================================================================

/// What marker stripping found and left behind.
#[derive(Clone, Debug, Default)]
pub struct StripOutcome {
    /// Text with mention/nickname/prefix markers removed.
    pub text: String,
    /// The endpoint was explicitly at-mentioned.
    pub mentioned: bool,
    /// The message was addressed to the endpoint (mention or nickname).
    pub nicknamed: bool,
    /// The matched command prefix. `Some("")` (the empty prefix) is a
    /// valid match meaning "no prefix required" and is distinct from
    /// `None`, "no prefix present".
    pub prefix: Option<String>,
}

pub(crate) fn strip_markers(event: &MessageEvent, config: &RouterConfig) -> StripOutcome {
    let mut text = event.text.trim();
    let mut mentioned = false;
    let mut nicknamed = false;

    if !event.is_private() {
        let token = config.mention_token(event.self_id);
        if !token.is_empty() && text.starts_with(&token) {
            text = text[token.len()..].trim_start();
            mentioned = true;
            nicknamed = true;
        }
    }

    for nick in &config.nicknames {
        if !nick.is_empty() && text.starts_with(nick.as_str()) {
            text = text[nick.len()..]
                .trim_start_matches([',', ':', ';'])
                .trim_start();
            nicknamed = true;
            break;
        }
    }

    let mut prefix = None;
    for p in &config.prefixes {
        if p.is_empty() {
            // The empty prefix matches any text; place it last in the
            // configured list to give concrete prefixes a chance.
            prefix = Some(String::new());
            break;
        }
        if text.starts_with(p.as_str()) {
            text = text[p.len()..].trim_start();
            prefix = Some(p.clone());
            break;
        }
    }

    StripOutcome {
        text: text.to_string(),
        mentioned,
        nicknamed,
        prefix,
    }
}

// ============================================================================
// Argument splitting
// ============================================================================

/// Shell-like argument splitting: whitespace separation, single and
/// double quotes, backslash escapes inside double quotes.
pub(crate) fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ' ' | '\t' if !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Splits raw tokens into positional args and `--key=value` options.
fn partition_tokens(tokens: Vec<String>) -> (Vec<String>, HashMap<String, String>) {
    let mut args = Vec::new();
    let mut options = HashMap::new();
    for token in tokens {
        if let Some(rest) = token.strip_prefix("--") {
            if let Some((key, value)) = rest.split_once('=') {
                options.insert(key.to_string(), value.to_string());
                continue;
            }
        }
        args.push(token);
    }
    (args, options)
}

// ============================================================================
// Resolver
// ============================================================================

/// Registered tables the resolver reads: commands and shortcuts.
pub(crate) struct Resolver {
    pub(crate) commands: CommandTable,
    shortcuts: RwLock<Vec<ShortcutRule>>,
}

impl Resolver {
    pub(crate) fn new() -> Self {
        Self {
            commands: CommandTable::new(),
            shortcuts: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register_shortcut(&self, rule: ShortcutRule) {
        debug!(token = %rule.token, command = %rule.command, "registering shortcut");
        self.shortcuts.write().push(rule);
    }

    /// Runs the ordered resolution algorithm over pre-stripped text.
    pub(crate) fn resolve(
        &self,
        event: &MessageEvent,
        stripped: &StripOutcome,
        config: &RouterConfig,
    ) -> Resolution {
        let demanded = stripped.prefix.is_some() || stripped.nicknamed || event.is_private();

        if demanded {
            if let Some(parsed) = self.strict_parse(&stripped.text, event) {
                trace!(command = %parsed.command.spec.name, "strict parse succeeded");
                return Resolution::Command(parsed);
            }
        }

        if stripped.prefix.is_none() {
            if let Some(parsed) = self.shortcut_parse(&stripped.text, stripped.nicknamed, event) {
                trace!(command = %parsed.command.spec.name, "shortcut matched");
                return Resolution::Command(parsed);
            }
        }

        if stripped.prefix.is_some() || stripped.nicknamed {
            if let Some(suggestion) = self.suggest(&stripped.text, config) {
                return Resolution::Suggest(suggestion);
            }
        }

        Resolution::None
    }

    /// Strict parse: first whitespace-delimited token against the
    /// command table, scoped to contexts matching the event.
    pub(crate) fn strict_parse(
        &self,
        text: &str,
        event: &MessageEvent,
    ) -> Option<ParsedCommandLine> {
        let mut tokens = split_args(text);
        if tokens.is_empty() {
            return None;
        }
        let name = tokens.remove(0);
        let command = self.commands.lookup(&name, event)?;
        let (args, options) = partition_tokens(tokens);
        Some(ParsedCommandLine {
            command,
            args,
            options,
        })
    }

    /// Shortcut resolution in registration order.
    fn shortcut_parse(
        &self,
        text: &str,
        nicknamed: bool,
        event: &MessageEvent,
    ) -> Option<ParsedCommandLine> {
        let shortcuts = self.shortcuts.read();
        for rule in shortcuts.iter() {
            if rule.prefix_required && !nicknamed {
                continue;
            }

            let remainder = if rule.fuzzy {
                let Some(rest) = text.strip_prefix(rule.token.as_str()) else {
                    continue;
                };
                // Without an implied prefix, the character after the
                // token must not start a new bare word: "sayhello" must
                // not fuzzy-match "say".
                if !rule.prefix_required
                    && rest.chars().next().is_some_and(|c| c.is_alphanumeric())
                {
                    continue;
                }
                rest
            } else {
                let (first, rest) = match text.split_once(char::is_whitespace) {
                    Some((first, rest)) => (first, rest),
                    None => (text, ""),
                };
                if first != rule.token {
                    continue;
                }
                rest
            };

            // A rule whose command is out of scope for this event does
            // not end the search; later rules may still match.
            let Some(command) = self.commands.lookup(&rule.command, event) else {
                continue;
            };
            let remainder = remainder.trim();
            let (args, mut options) = if rule.single_arg {
                let args = if remainder.is_empty() {
                    Vec::new()
                } else {
                    vec![remainder.to_string()]
                };
                (args, HashMap::new())
            } else {
                partition_tokens(split_args(remainder))
            };
            for (key, value) in &rule.defaults {
                options
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            return Some(ParsedCommandLine {
                command,
                args,
                options,
            });
        }
        None
    }

    /// Scores the first token of the text against every registered
    /// command name and returns the best match above the configured
    /// similarity threshold.
    fn suggest(&self, text: &str, config: &RouterConfig) -> Option<Suggestion> {
        let token = text.split_whitespace().next()?.to_lowercase();
        let mut best: Option<Suggestion> = None;
        for name in self.commands.names() {
            let score = strsim::normalized_levenshtein(&token, &name);
            if score < config.similarity {
                continue;
            }
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(Suggestion {
                    name,
                    original: text.to_string(),
                    score,
                });
            }
        }
        best
    }
}

/// The user-state fields a dispatch must load: the universal set plus
/// whatever the resolved command declared.
pub(crate) fn aggregate_fields(resolution: &Resolution) -> Vec<&str> {
    let mut fields: Vec<&str> = trellis_core::UNIVERSAL_FIELDS.to_vec();
    if let Resolution::Command(parsed) = resolution {
        for field in &parsed.command.spec.required_fields {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
    }
    fields
}
