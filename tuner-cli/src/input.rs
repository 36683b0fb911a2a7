//! # Input Module
//!
//! Parses one line of user input into an [`Input`].

use anyhow::{Context, Result, anyhow, bail};
use tuner_core::{Command, PitchSample, notes};

/// Everything a user can type at the prompt.
#[derive(Debug, Clone)]
pub enum Input {
    // Pitch source stand-in
    Pitch(PitchSample),

    // Commands passed straight to the engine
    Engine(Command),

    // Commands that need the tuning list to resolve their argument
    UseTuning(String),      // Preset name, custom name, or note symbols
    Favourite(bool),        // (Un)favourite the current tuning
    SaveCustom(String),     // Name the current tuning
    DeleteCustom(String),   // Delete a custom tuning by name

    Play(usize),
    Presets,
    List,
    Status,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Input> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "pitch" | "p" => {
            let frequency: f64 = rest
                .parse()
                .with_context(|| format!("'{}' is not a frequency", rest))?;
            if !(frequency.is_finite() && frequency > 0.0) {
                bail!("frequency must be positive");
            }
            Input::Pitch(PitchSample::pitched(frequency))
        }
        "silence" | "s" => Input::Pitch(PitchSample::silence()),
        "string" => Input::Engine(Command::SelectString(index(rest)?)),
        "note" => Input::Engine(Command::SelectNote(notes::index_of_symbol(rest)?)),
        "auto" => match rest {
            "on" => Input::Engine(Command::SetAutoDetect(true)),
            "off" => Input::Engine(Command::SetAutoDetect(false)),
            _ => bail!("usage: auto on|off"),
        },
        "tuning" | "t" => {
            if rest.is_empty() {
                bail!("usage: tuning <preset | custom name | note symbols>");
            }
            Input::UseTuning(rest.to_string())
        }
        "chromatic" => Input::Engine(Command::SetChromatic),
        "up" => match rest {
            "" => Input::Engine(Command::TuneUp),
            i => Input::Engine(Command::TuneStringUp(index(i)?)),
        },
        "down" => match rest {
            "" => Input::Engine(Command::TuneDown),
            i => Input::Engine(Command::TuneStringDown(index(i)?)),
        },
        "tuned" => match rest {
            "" => Input::Engine(Command::MarkSelectedTuned),
            i => Input::Engine(Command::SetTuned(index(i)?, true)),
        },
        "untuned" => Input::Engine(Command::SetTuned(index(rest)?, false)),
        "fav" => Input::Favourite(true),
        "unfav" => Input::Favourite(false),
        "custom" => {
            if rest.is_empty() {
                bail!("usage: custom <name>");
            }
            Input::SaveCustom(rest.to_string())
        }
        "uncustom" => Input::DeleteCustom(rest.to_string()),
        "play" => Input::Play(index(rest)?),
        "presets" => Input::Presets,
        "list" | "ls" => Input::List,
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(anyhow!("unknown command '{}', try 'help'", other)),
    };
    Ok(input)
}

fn index(text: &str) -> Result<usize> {
    text.parse()
        .with_context(|| format!("'{}' is not a string number", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_lines() {
        match parse("pitch 82.41").unwrap() {
            Input::Pitch(sample) => {
                assert!(sample.is_pitched);
                assert_eq!(sample.frequency, 82.41);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse("silence").unwrap(), Input::Pitch(s) if !s.is_pitched));
        assert!(parse("pitch -3").is_err());
        assert!(parse("pitch loud").is_err());
    }

    #[test]
    fn test_engine_commands() {
        assert!(matches!(
            parse("string 3").unwrap(),
            Input::Engine(Command::SelectString(3))
        ));
        assert!(matches!(
            parse("note C#5").unwrap(),
            Input::Engine(Command::SelectNote(4))
        ));
        assert!(matches!(parse("up").unwrap(), Input::Engine(Command::TuneUp)));
        assert!(matches!(
            parse("down 5").unwrap(),
            Input::Engine(Command::TuneStringDown(5))
        ));
        assert!(matches!(
            parse("  AUTO   off ").unwrap(),
            Input::Engine(Command::SetAutoDetect(false))
        ));
    }

    #[test]
    fn test_resolved_commands_keep_argument() {
        assert!(matches!(parse("tuning Drop D").unwrap(), Input::UseTuning(name) if name == "Drop D"));
        assert!(matches!(parse("custom My Low C").unwrap(), Input::SaveCustom(name) if name == "My Low C"));
    }

    #[test]
    fn test_bad_input() {
        assert!(parse("note Eb2").is_err());
        assert!(parse("string x").is_err());
        assert!(parse("tuning").is_err());
        assert!(parse("frobnicate").is_err());
    }
}
