//! The built-in first-stage handler.
//!
//! Always occupies position 0 of every dispatch chain, conceptually
//! separate from user middleware. It strips addressing markers, runs the
//! resolver, loads the user record (one observe per dispatch, covering
//! the universal fields plus whatever the resolved command declared),
//! applies the gating policy, and either returns early — the dispatch
//! still completes, the terminal step just never runs — or continues the
//! chain, installing the terminal command-execution step when a command
//! resolved.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use trellis_core::{ChannelFlags, Id, IdentityKind, render_outbound};

use crate::broadcast::Notice;
use crate::error::{RouterError, RouterResult};
use crate::pipeline::{
    BoxedMiddleware, DispatchContext, Middleware, MiddlewareFuture, Next, middleware_fn,
};
use crate::resolve::{CommandInvocation, Resolution, aggregate_fields, strip_markers};
use crate::router::Shared;

/// Conversation origin a pending suggestion is keyed by.
pub(crate) type OriginKey = (Id, Option<Id>, Option<Id>);

/// A one-shot suggestion awaiting acceptance from its origin.
pub(crate) struct PendingSuggestion {
    pub(crate) command: String,
    pub(crate) original: String,
}

pub(crate) struct Preprocessor {
    shared: Arc<Shared>,
}

impl Preprocessor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl Middleware for Preprocessor {
    fn handle(&self, ctx: Arc<DispatchContext>, next: Next) -> MiddlewareFuture {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move { preprocess(shared, ctx, next).await })
    }
}

async fn preprocess(
    shared: Arc<Shared>,
    ctx: Arc<DispatchContext>,
    next: Next,
) -> RouterResult<()> {
    let event = ctx.event().clone();
    let stripped = strip_markers(&event, &shared.config);
    let origin: OriginKey = (event.sender, event.group, event.discuss);

    // A parked suggestion is one-shot: whatever this message is, it is
    // consumed now.
    let pending = shared.pending.lock().remove(&origin);
    let mut resolution = match pending {
        Some(p) if stripped.text.trim() == shared.config.accept_word => {
            let rebuilt = substitute_first_token(&p.original, &p.command);
            debug!(command = %p.command, "pending suggestion accepted");
            match shared.resolver.strict_parse(&rebuilt, &event) {
                Some(parsed) => Resolution::Command(parsed),
                None => Resolution::None,
            }
        }
        _ => shared.resolver.resolve(&event, &stripped, &shared.config),
    };

    ctx.set_state(stripped.clone());

    // Gating applies only when a backing store is configured.
    let mut flags = ChannelFlags::default();
    if let Some(store) = &shared.store {
        let fields = aggregate_fields(&resolution);
        let mut record = store
            .observe(event.sender, IdentityKind::User, &fields)
            .await?;

        if record.ignore {
            debug!(sender = event.sender, "identity ignored, suppressing dispatch");
            return Ok(());
        }
        if let Some(until) = record.ignore_until {
            if unix_now() < until {
                debug!(sender = event.sender, until, "identity ignored until expiry");
                return Ok(());
            }
            record.clear_ignore_until();
        }

        flags = store.channel_flags(&event).await?;
        if flags.no_command && !matches!(resolution, Resolution::None) {
            debug!(scope = ?event.reply_target(), "command parsing suppressed by scope flag");
            resolution = Resolution::None;
        }

        ctx.set_record(record);
    }

    match resolution {
        Resolution::Command(parsed) => {
            let required = parsed.command.spec.authority;
            let actual = ctx.record().map(|r| r.authority).unwrap_or(0);
            if actual < required {
                debug!(
                    command = %parsed.command.spec.name,
                    required,
                    actual,
                    "insufficient authority, skipping terminal step"
                );
                return next.proceed().await;
            }
            ctx.set_command(parsed);
            next.proceed_with(terminal(shared)).await
        }
        Resolution::Suggest(suggestion) => {
            if flags.no_response && !stripped.mentioned {
                return Ok(());
            }
            shared.pending.lock().insert(
                origin,
                PendingSuggestion {
                    command: suggestion.name.clone(),
                    original: suggestion.original,
                },
            );
            let prompt = shared.config.render_prompt(&suggestion.name);
            ctx.sender()
                .send(event.reply_target(), &render_outbound(&prompt))
                .await?;
            Ok(())
        }
        Resolution::None => {
            if flags.no_response && !stripped.mentioned {
                return Ok(());
            }
            next.proceed().await
        }
    }
}

/// The terminal step appended via `proceed_with` once a command is
/// cleared for execution: runs the handler, sends the reply, emits the
/// command notice, and deliberately never proceeds further.
fn terminal(shared: Arc<Shared>) -> BoxedMiddleware {
    middleware_fn(move |ctx: Arc<DispatchContext>, _next: Next| {
        let shared = Arc::clone(&shared);
        async move {
            let Some(parsed) = ctx.take_command() else {
                return Ok(());
            };
            let name = parsed.command.spec.name.clone();
            let invocation = CommandInvocation {
                event: ctx.event().clone(),
                args: parsed.args,
                options: parsed.options,
                record: ctx.record(),
            };
            let reply = (parsed.command.spec.handler)(invocation).await.map_err(|err| {
                RouterError::CommandFault {
                    name: name.clone(),
                    message: err.to_string(),
                }
            })?;
            ctx.note_executed(&name);
            if let Some(reply) = reply {
                ctx.sender()
                    .send(ctx.event().reply_target(), &render_outbound(&reply))
                    .await?;
            }
            shared
                .broadcaster
                .broadcast(Notice::command(ctx.event().clone(), name))
                .await;
            Ok(())
        }
    })
}

fn substitute_first_token(original: &str, name: &str) -> String {
    match original.split_once(char::is_whitespace) {
        Some((_, rest)) => format!("{name} {rest}"),
        None => name.to_string(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_is_substituted() {
        assert_eq!(substitute_first_token("pign now", "ping"), "ping now");
        assert_eq!(substitute_first_token("pign", "ping"), "ping");
    }
}
