//! Table formatting utilities for CLI output.

use std::fmt::Write as _;

use murmur_core::{Generation, SamplingConfig, VoiceParams};
use murmur_stream::ManagerStatus;
use murmur_voice::SpeechStatus;

/// Truncates a string to at most `max_chars` characters, adding "..." if
/// anything was cut.
///
/// ```rust
/// use murmur_cli::presentation::truncate_string;
///
/// assert_eq!(truncate_string("Hello", 10), "Hello");
/// assert_eq!(truncate_string("Hello World", 8), "Hello...");
/// ```
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// One-line summary of every sampling parameter.
pub fn format_params(config: &SamplingConfig) -> String {
    let mut line = format!(
        "temperature={} top_p={} top_k={} num_predict={} repeat_penalty={} \
         presence_penalty={} frequency_penalty={} mirostat_mode={} mirostat_tau={} \
         mirostat_eta={}",
        config.temperature,
        config.top_p,
        config.top_k,
        config.num_predict,
        config.repeat_penalty,
        config.presence_penalty,
        config.frequency_penalty,
        config.mirostat_mode.as_u8(),
        config.mirostat_tau,
        config.mirostat_eta,
    );
    if !config.hot_word.is_empty() {
        let _ = write!(
            line,
            " hot_word={:?} hot_word_boost={}",
            config.hot_word, config.hot_word_boost
        );
    }
    if !config.truncation_active() {
        line.push_str(" (top_p/top_k inactive under mirostat)");
    }
    line
}

pub fn format_voice(voice: &VoiceParams) -> String {
    format!(
        "voice {} speed={} pitch={} tempo={} pause={}ms",
        if voice.enabled { "on" } else { "off" },
        voice.speed,
        voice.pitch,
        voice.tempo,
        voice.pause_after().as_millis(),
    )
}

/// History as a table, newest first.
pub fn history_table(history: &[Generation], width: usize) -> String {
    if history.is_empty() {
        return "No generations yet.".to_string();
    }

    let mut out = format!("{:<5} {:<9} {:<6} {:<5} Text\n", "#", "Finished", "Temp", "TopK");
    out.push_str(&"-".repeat(width));
    for generation in history {
        let params = generation.params();
        let text = generation.text().replace('\n', " ");
        let _ = write!(
            out,
            "\n{:<5} {:<9} {:<6} {:<5} {}",
            generation.tag().index,
            generation.completed_at().format("%H:%M:%S"),
            params.temperature,
            params.top_k,
            truncate_string(text.trim(), width.saturating_sub(29)),
        );
    }
    out
}

/// Lines for the `status` line command.
pub fn status_lines(
    status: &ManagerStatus,
    params: &SamplingConfig,
    voice: &VoiceParams,
    speech: Option<&SpeechStatus>,
) -> Vec<String> {
    let session = status
        .session_id
        .map_or_else(|| "none".to_string(), |id| id.to_string());
    let mut lines = vec![
        format!(
            "session {session}: {:?}, {} chars",
            status.state,
            status.current_response.chars().count()
        ),
        format!(
            "continuous={} paused={} halted={} restart_pending={} history={}",
            status.continuous,
            status.paused,
            status.halted,
            status.restart_pending,
            status.history_len
        ),
        format!(
            "next context: {:?}",
            truncate_string(&status.next_context, 60)
        ),
        format_params(params),
        format_voice(voice),
    ];
    if let Some(speech) = speech {
        lines.push(format!(
            "speech via {}: {} queued, {} spoken, {} failed{}",
            speech.backend,
            speech.pending,
            speech.spoken,
            speech.failed,
            if speech.available { "" } else { " (unavailable)" }
        ));
    }
    lines
}
