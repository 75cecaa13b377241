//! CLI bootstrap - the composition root.
//!
//! The only place where concrete adapters are wired together. Settings are
//! layered as defaults, then `MURMUR_*` environment variables (including a
//! `.env` file loaded by `main`), then command-line flags.

use std::sync::Arc;

use murmur_core::{
    ControllerSettings, LiveParams, LiveVoiceParams, ParamsPatch, ParamsService,
    SamplingConfig, SettingsError, SpeechGranularity, VoiceParams, validate_settings,
};
use murmur_stream::{HttpControlClient, HttpTransport};

use crate::commands::RunArgs;
use crate::error::CliError;

/// Settings given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub server_url: Option<String>,
    pub settle_delay_ms: Option<u64>,
    pub history_capacity: Option<usize>,
    pub continuous: Option<bool>,
    pub context_tail_chars: Option<usize>,
    pub initial_context: Option<String>,
    pub narration: Option<bool>,
    pub speech_granularity: Option<SpeechGranularity>,
}

impl SettingsOverrides {
    /// Overrides shared by every command.
    pub fn global(server_url: Option<String>) -> Self {
        Self {
            server_url,
            ..Self::default()
        }
    }

    /// Overrides for `run`.
    pub fn for_run(server_url: Option<String>, args: &RunArgs) -> Self {
        Self {
            server_url,
            settle_delay_ms: args.settle_ms,
            history_capacity: args.history,
            continuous: args.once.then_some(false),
            context_tail_chars: args.tail_chars,
            initial_context: args.context.clone(),
            narration: args.no_voice.then_some(false),
            speech_granularity: args.granularity,
        }
    }

    fn apply_to(&self, settings: &mut ControllerSettings) {
        if let Some(url) = &self.server_url {
            settings.server_url.clone_from(url);
        }
        if let Some(ms) = self.settle_delay_ms {
            settings.settle_delay_ms = ms;
        }
        if let Some(capacity) = self.history_capacity {
            settings.history_capacity = capacity;
        }
        if let Some(continuous) = self.continuous {
            settings.continuous = continuous;
        }
        if let Some(chars) = self.context_tail_chars {
            settings.context_tail_chars = chars;
        }
        if let Some(context) = &self.initial_context {
            settings.initial_context.clone_from(context);
        }
        if let Some(narration) = self.narration {
            settings.narration = narration;
        }
        if let Some(granularity) = self.speech_granularity {
            settings.speech_granularity = granularity;
        }
    }
}

/// Layer defaults, `lookup` (the environment) and `overrides`, then validate.
pub fn resolve_settings<F>(
    overrides: &SettingsOverrides,
    lookup: F,
) -> Result<ControllerSettings, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = ControllerSettings::with_defaults();
    settings.overlay_from(lookup)?;
    overrides.apply_to(&mut settings);
    validate_settings(&settings)?;
    Ok(settings)
}

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub settings: ControllerSettings,
    /// SSE transport for `/stream`.
    pub transport: Arc<HttpTransport>,
    /// Client for the collaborator endpoints.
    pub control: Arc<HttpControlClient>,
    /// Live sampling parameters, forwarded to the server on edit.
    pub params: ParamsService,
    pub voice: LiveVoiceParams,
}

impl CliContext {
    pub const fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn live_params(&self) -> &LiveParams {
        self.params.live()
    }
}

/// Build the context. `initial` is applied to the local parameters only.
pub fn bootstrap(
    settings: ControllerSettings,
    initial: &ParamsPatch,
) -> Result<CliContext, CliError> {
    let transport = Arc::new(HttpTransport::new(&settings.server_url)?);
    let control = Arc::new(HttpControlClient::new(&settings.server_url)?);

    let live = LiveParams::new(SamplingConfig::default());
    live.apply(initial)?;
    let params = ParamsService::new(live, control.clone());

    let voice = LiveVoiceParams::new(VoiceParams {
        enabled: settings.narration,
        ..VoiceParams::default()
    });

    tracing::debug!(
        server_url = %settings.server_url,
        settle_delay_ms = settings.settle_delay_ms,
        continuous = settings.continuous,
        narration = settings.narration,
        "CLI bootstrapped"
    );

    Ok(CliContext {
        settings,
        transport,
        control,
        params,
        voice,
    })
}

/// Merge `k=v` assignments into one patch.
pub fn parse_assignments(assignments: &[String]) -> Result<ParamsPatch, CliError> {
    assignments.iter().try_fold(ParamsPatch::default(), |patch, raw| {
        Ok(patch.merged(ParamsPatch::parse_assignment(raw)?))
    })
}
