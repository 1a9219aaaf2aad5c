//! Logging setup for the marshaling layer.
//!
//! Library code logs through the `log` facade; [`init_logging`] installs a
//! `tracing` subscriber that picks those records up through `LogTracer` and
//! hands each one to an optional process-wide hook. The MEX entry points use
//! the hook to forward records to the host's print channel.

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_log::LogTracer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "MEXPIPE_LOG";

const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeLogRecord {
    pub ts: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonValue>,
}

type LogHook = Arc<dyn Fn(&RuntimeLogRecord) + Send + Sync>;

static LOG_HOOK: OnceCell<LogHook> = OnceCell::new();

pub struct LoggingGuard {
    _guard: Option<DefaultGuard>,
}

impl LoggingGuard {
    /// True when the subscriber became the process-wide default.
    pub fn is_global(&self) -> bool {
        self._guard.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoggingOptions {
    /// Filter directives; `MEXPIPE_LOG` wins when set.
    pub filter: Option<String>,
}

/// Install the record hook. Only the first hook installed is kept.
pub fn set_runtime_log_hook<F>(hook: F) -> bool
where
    F: Fn(&RuntimeLogRecord) + Send + Sync + 'static,
{
    LOG_HOOK.set(Arc::new(hook)).is_ok()
}

pub fn init_logging(opts: LoggingOptions) -> LoggingGuard {
    // Install LogTracer so log:: macros flow into tracing
    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(opts.filter.as_deref().unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let build_subscriber = || {
        tracing_subscriber::registry()
            .with(env_filter.clone())
            .with(LogBridgeLayer)
    };

    let guard = match tracing::subscriber::set_global_default(build_subscriber()) {
        Ok(()) => None,
        Err(_) => Some(tracing::subscriber::set_default(build_subscriber())),
    };

    LoggingGuard { _guard: guard }
}

struct LogBridgeLayer;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl<S> Layer<S> for LogBridgeLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let hook = match LOG_HOOK.get() {
            Some(h) => h,
            None => return,
        };

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        // Records bridged from `log` carry their origin in `log.*` fields.
        let target = visitor
            .log_target
            .take()
            .unwrap_or_else(|| event.metadata().target().to_string());

        let record = RuntimeLogRecord {
            ts: now_rfc3339(),
            level: event.metadata().level().to_string(),
            target,
            message: visitor
                .message
                .unwrap_or_else(|| event.metadata().name().to_string()),
            fields: visitor
                .fields
                .filter(|obj| obj.as_object().map(|m| !m.is_empty()).unwrap_or(false)),
        };

        hook(&record);
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    log_target: Option<String>,
    fields: Option<JsonValue>,
}

impl JsonVisitor {
    fn insert(&mut self, name: &str, entry: JsonValue) {
        if name.starts_with("log.") {
            if name == "log.target" {
                self.log_target = entry.as_str().map(str::to_string);
            }
            return;
        }
        let obj = self
            .fields
            .get_or_insert_with(|| JsonValue::Object(Default::default()));
        if let JsonValue::Object(map) = obj {
            map.insert(name.to_string(), entry);
        }
    }
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field.name(), serde_json::json!(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field.name(), JsonValue::String(value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn log_hook_receives_record() {
        let captured: Arc<Mutex<Vec<RuntimeLogRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let hook = {
            let c = captured.clone();
            move |rec: &RuntimeLogRecord| {
                c.lock().unwrap().push(rec.clone());
            }
        };
        set_runtime_log_hook(hook);
        let _guard = init_logging(LoggingOptions {
            filter: Some("info".to_string()),
        });

        tracing::info!(slots = 2, "hello world");
        log::warn!(target: "mexpipe::call", "bridged from log");

        let items = captured.lock().unwrap();
        assert!(items.iter().any(|r| r.message.contains("hello world")
            && r.fields.as_ref().and_then(|f| f.get("slots")).is_some()));
        assert!(items
            .iter()
            .any(|r| r.message.contains("bridged from log") && r.target == "mexpipe::call"));
    }
}
