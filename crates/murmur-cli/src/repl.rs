//! Line commands accepted on stdin while `run` is streaming.

use std::str::FromStr;

use murmur_core::{Nudge, ParamError, ParamField, ParamsPatch};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  set <param> <value>    change a sampling parameter (e.g. set temperature 0.7)
  +<param> / -<param>    nudge a numeric parameter by one step
  voice <speed|pitch|tempo> <value>
  voice on|off           enable or mute narration
  pause / resume         hold or release the automatic restart
  continuous on|off      restart automatically after each generation, or not
  start [<context>]      start a generation now, optionally from new text
  stop                   stop the current generation
  contexts               list the server's named contexts
  context <N>            select server context N for the next generation
  inject <text>          ask the server to splice text into the generation
  history                list committed generations, newest first
  status                 show session, parameter and voice state
  help                   show this text
  quit                   exit";

/// A voice control edited from the prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceEdit {
    Speed(f32),
    Pitch(f32),
    Tempo(f32),
    Enabled(bool),
}

/// One parsed line command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Set(ParamsPatch),
    Nudge(ParamField, Nudge),
    Voice(VoiceEdit),
    Pause,
    Resume,
    Continuous(bool),
    Start(Option<String>),
    Stop,
    Contexts,
    Context(usize),
    Inject(String),
    History,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplError {
    #[error("Unknown command {0:?} (type `help`)")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number {0:?}")]
    InvalidNumber(String),

    #[error("Invalid context index {0:?}")]
    InvalidIndex(String),

    #[error(transparent)]
    Param(#[from] ParamError),
}

impl ReplCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ReplError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if let Some(name) = line.strip_prefix('+') {
            return Ok(Some(Self::Nudge(parse_param(name)?, Nudge::Up)));
        }
        if let Some(name) = line.strip_prefix('-') {
            return Ok(Some(Self::Nudge(parse_param(name)?, Nudge::Down)));
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        let command = match word.to_ascii_lowercase().as_str() {
            "set" => {
                let (name, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ReplError::Usage("set <param> <value>"))?;
                Self::Set(ParamsPatch::parse_field(name, value.trim())?)
            }
            "voice" => Self::Voice(parse_voice(rest)?),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "continuous" => match rest.to_ascii_lowercase().as_str() {
                "on" => Self::Continuous(true),
                "off" => Self::Continuous(false),
                _ => return Err(ReplError::Usage("continuous on|off")),
            },
            "start" => Self::Start((!rest.is_empty()).then(|| rest.to_string())),
            "stop" => Self::Stop,
            "contexts" => Self::Contexts,
            "context" => {
                if rest.is_empty() {
                    return Err(ReplError::Usage("context <N>"));
                }
                let index = rest
                    .parse::<usize>()
                    .map_err(|_| ReplError::InvalidIndex(rest.to_string()))?;
                Self::Context(index)
            }
            "inject" if rest.is_empty() => return Err(ReplError::Usage("inject <text>")),
            "inject" => Self::Inject(rest.to_string()),
            "history" => Self::History,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => return Err(ReplError::UnknownCommand(word.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_param(name: &str) -> Result<ParamField, ReplError> {
    let name = name.trim();
    ParamField::from_str(name).map_err(|_| ParamError::UnknownParam(name.to_string()).into())
}

fn parse_voice(args: &str) -> Result<VoiceEdit, ReplError> {
    const USAGE: &str = "voice <speed|pitch|tempo> <value> | voice on|off";

    let mut parts = args.split_whitespace();
    let (Some(control), value, None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ReplError::Usage(USAGE));
    };

    let number = |raw: Option<&str>| -> Result<f32, ReplError> {
        let raw = raw.ok_or(ReplError::Usage(USAGE))?;
        raw.parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ReplError::InvalidNumber(raw.to_string()))
    };

    match (control.to_ascii_lowercase().as_str(), value) {
        ("on", None) => Ok(VoiceEdit::Enabled(true)),
        ("off", None) => Ok(VoiceEdit::Enabled(false)),
        ("speed", v) => Ok(VoiceEdit::Speed(number(v)?)),
        ("pitch", v) => Ok(VoiceEdit::Pitch(number(v)?)),
        ("tempo", v) => Ok(VoiceEdit::Tempo(number(v)?)),
        _ => Err(ReplError::Usage(USAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ReplCommand {
        ReplCommand::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_set_builds_single_field_patch() {
        let ReplCommand::Set(patch) = parse("set temperature 0.7") else {
            panic!("expected set");
        };
        assert_eq!(patch.temperature, Some(0.7));
        assert_eq!(
            patch,
            ParamsPatch {
                temperature: Some(0.7),
                ..ParamsPatch::default()
            }
        );
    }

    #[test]
    fn test_hot_word_keeps_spaces() {
        let ReplCommand::Set(patch) = parse("set hot_word  ocean waves") else {
            panic!("expected set");
        };
        assert_eq!(patch.hot_word.as_deref(), Some("ocean waves"));
    }

    #[test]
    fn test_nudges() {
        assert_eq!(
            parse("+top_k"),
            ReplCommand::Nudge(ParamField::TopK, Nudge::Up)
        );
        assert_eq!(
            parse(" -temperature "),
            ReplCommand::Nudge(ParamField::Temperature, Nudge::Down)
        );
        assert!(matches!(
            ReplCommand::parse("+warmth"),
            Err(ReplError::Param(ParamError::UnknownParam(_)))
        ));
    }

    #[test]
    fn test_voice_edits() {
        assert_eq!(parse("voice speed 1.5"), ReplCommand::Voice(VoiceEdit::Speed(1.5)));
        assert_eq!(parse("voice OFF"), ReplCommand::Voice(VoiceEdit::Enabled(false)));
        assert_eq!(
            ReplCommand::parse("voice tempo fast"),
            Err(ReplError::InvalidNumber("fast".into()))
        );
        assert!(matches!(
            ReplCommand::parse("voice on loud"),
            Err(ReplError::Usage(_))
        ));
        assert!(matches!(ReplCommand::parse("voice"), Err(ReplError::Usage(_))));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse("PAUSE"), ReplCommand::Pause);
        assert_eq!(parse("resume"), ReplCommand::Resume);
        assert_eq!(parse("quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("   "), Ok(None));
        assert_eq!(
            ReplCommand::parse("rewind"),
            Err(ReplError::UnknownCommand("rewind".into()))
        );
    }

    #[test]
    fn test_session_commands() {
        assert_eq!(parse("start"), ReplCommand::Start(None));
        assert_eq!(
            parse("start  The lighthouse keeper "),
            ReplCommand::Start(Some("The lighthouse keeper".into()))
        );
        assert_eq!(parse("continuous OFF"), ReplCommand::Continuous(false));
        assert_eq!(
            ReplCommand::parse("continuous maybe"),
            Err(ReplError::Usage("continuous on|off"))
        );
    }

    #[test]
    fn test_context_and_inject_commands() {
        assert_eq!(parse("contexts"), ReplCommand::Contexts);
        assert_eq!(parse("context 2"), ReplCommand::Context(2));
        assert_eq!(
            ReplCommand::parse("context two"),
            Err(ReplError::InvalidIndex("two".into()))
        );
        assert_eq!(
            ReplCommand::parse("context"),
            Err(ReplError::Usage("context <N>"))
        );
        assert_eq!(
            parse("inject but wait, let's reconsider"),
            ReplCommand::Inject("but wait, let's reconsider".into())
        );
        assert_eq!(
            ReplCommand::parse("inject   "),
            Err(ReplError::Usage("inject <text>"))
        );
    }

    #[test]
    fn test_set_without_value_is_usage_error() {
        assert_eq!(
            ReplCommand::parse("set temperature"),
            Err(ReplError::Usage("set <param> <value>"))
        );
        assert!(matches!(
            ReplCommand::parse("set top_k 4.5"),
            Err(ReplError::Param(ParamError::InvalidValue { .. }))
        ));
    }
}
