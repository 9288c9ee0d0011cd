//! Logging and `OpenTelemetry` setup for the runner.
//!
//! [`Telemetry`] always installs a console `tracing` subscriber. With the
//! `telemetry` feature, OTLP trace and metric exporters are added when the
//! standard `OTEL_EXPORTER_OTLP_*` environment variables are present.

#[cfg(feature = "telemetry")]
use std::env;
#[cfg(feature = "telemetry")]
use std::time::Duration;

#[cfg(feature = "telemetry")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "telemetry")]
use opentelemetry::{KeyValue, Value, global};
#[cfg(feature = "telemetry")]
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
#[cfg(feature = "telemetry")]
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
#[cfg(feature = "telemetry")]
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Resolve an env var with a programmatic fallback.
#[cfg(feature = "telemetry")]
fn resolve_env(env_key: &str, fallback: Option<&String>) -> Option<Value> {
    env::var(env_key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.cloned())
        .map(Value::from)
}

/// Detects OTLP protocol from environment. Returns `None` if OTEL is not configured.
#[cfg(feature = "telemetry")]
fn detect_protocol() -> Option<OtlpProtocol> {
    let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
        || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
        || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
    is_enabled.then(|| {
        env::var("OTEL_EXPORTER_OTLP_PROTOCOL")
            .ok()
            .map_or(OtlpProtocol::Http, |s| match s.as_str() {
                "grpc" => OtlpProtocol::Grpc,
                _ => OtlpProtocol::Http,
            })
    })
}

#[cfg(feature = "telemetry")]
#[derive(Debug, Clone, Copy)]
enum OtlpProtocol {
    Http,
    Grpc,
}

/// Service identity and log level for the subscriber.
///
/// Name and version can be overridden via `OTEL_SERVICE_NAME` and
/// `OTEL_SERVICE_VERSION`; the deployment environment comes only from
/// `OTEL_SERVICE_DEPLOYMENT`.
#[derive(Debug, Default)]
#[cfg_attr(not(feature = "telemetry"), allow(dead_code))]
pub struct Telemetry {
    name: Option<String>,
    version: Option<String>,
    log_level: Option<String>,
}

impl Telemetry {
    /// Creates a new, empty [`Telemetry`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the log level filter used when `RUST_LOG` is not set.
    ///
    /// Accepts any valid [`EnvFilter`] directive string (e.g. `"debug"`,
    /// `"graceful=debug"`).
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    #[cfg(feature = "telemetry")]
    fn resource(&self) -> Resource {
        let name = resolve_env("OTEL_SERVICE_NAME", self.name.as_ref());
        let version = resolve_env("OTEL_SERVICE_VERSION", self.version.as_ref());
        let deployment = resolve_env("OTEL_SERVICE_DEPLOYMENT", None);

        let mut builder = Resource::builder();
        if let Some(name) = name {
            builder = builder.with_service_name(name);
        }
        let mut attributes = Vec::<KeyValue>::with_capacity(2);
        if let Some(version) = version {
            attributes.push(KeyValue::new(SERVICE_VERSION, version));
        }
        if let Some(deployment) = deployment {
            attributes.push(KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment));
        }
        if !attributes.is_empty() {
            builder = builder.with_schema_url(attributes, SCHEMA_URL);
        }
        builder.build()
    }

    #[cfg(feature = "telemetry")]
    fn init_tracer(&self, protocol: OtlpProtocol) -> Option<SdkTracerProvider> {
        let exporter = match protocol {
            OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .build(),
            OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .build(),
        };
        let exporter = exporter.ok()?;

        Some(
            SdkTracerProvider::builder()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(self.resource())
                .with_batch_exporter(exporter)
                .build(),
        )
    }

    #[cfg(feature = "telemetry")]
    fn init_meter(&self, protocol: OtlpProtocol) -> Option<SdkMeterProvider> {
        let exporter = match protocol {
            OtlpProtocol::Http => opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .build(),
            OtlpProtocol::Grpc => opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .build(),
        };
        let exporter = exporter.ok()?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(10))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();

        let provider = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(provider.clone());
        Some(provider)
    }

    /// Installs the global subscriber.
    ///
    /// Returns a [`TelemetryGuard`] that flushes exporters on drop; keep it
    /// alive until the shutdown handlers have run.
    pub fn register(self) -> TelemetryGuard {
        let fallback = self.log_level.as_deref().unwrap_or("info");
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

        #[cfg(feature = "telemetry")]
        {
            let protocol = detect_protocol();
            let (tracer_provider, meter_provider) = protocol.map_or_else(
                || (None, None),
                |p| (self.init_tracer(p), self.init_meter(p)),
            );

            let otel_layer = tracer_provider
                .as_ref()
                .map(|tp| OpenTelemetryLayer::new(tp.tracer("graceful")));
            let metrics_layer = meter_provider
                .as_ref()
                .map(|mp| MetricsLayer::new(mp.clone()));

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(metrics_layer)
                .with(otel_layer)
                .init();

            if protocol.is_some() {
                tracing::info!("OpenTelemetry exporters registered");
            } else {
                tracing::debug!("OpenTelemetry is not configured, console logging only");
            }

            TelemetryGuard {
                tracer_provider,
                meter_provider,
            }
        }

        #[cfg(not(feature = "telemetry"))]
        {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            TelemetryGuard {}
        }
    }
}

/// Owns the tracer and meter providers; flushes them on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    #[cfg(feature = "telemetry")]
    meter_provider: Option<SdkMeterProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        {
            if let Some(ref tp) = self.tracer_provider
                && let Err(err) = tp.shutdown()
            {
                tracing::error!(?err, "tracer provider shutdown error");
            }
            if let Some(ref mp) = self.meter_provider
                && let Err(err) = mp.shutdown()
            {
                tracing::error!(?err, "meter provider shutdown error");
            }
        }
    }
}
