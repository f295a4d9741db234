/// Options that control how an export treats audio.
///
/// This struct represents *library-level configuration*, not HTTP form fields directly.
/// The server and CLI are responsible for mapping user input into this type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Drop audio from the whole output. Wins over `cancel_male_voice`.
    pub mute: bool,

    /// Replace the speech track with the one returned by the voice-cancellation service.
    ///
    /// Only honored when `mute` is false.
    pub cancel_male_voice: bool,
}

/// What the pipeline should do with audio, after resolving option precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPolicy {
    /// Keep the upload's own audio track.
    Original,
    /// Try to substitute the voice-cancelled track; fall back to `Original` on failure.
    CancelVoice,
    /// No audio in the output.
    Mute,
}

impl ExportOptions {
    pub fn audio_policy(&self) -> AudioPolicy {
        if self.mute {
            AudioPolicy::Mute
        } else if self.cancel_male_voice {
            AudioPolicy::CancelVoice
        } else {
            AudioPolicy::Original
        }
    }
}

/// Parse a boolean form flag the way the editor front-end sends it: only `"true"` is true.
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_overrides_voice_cancellation() {
        let opts = ExportOptions {
            mute: true,
            cancel_male_voice: true,
        };
        assert_eq!(opts.audio_policy(), AudioPolicy::Mute);
    }

    #[test]
    fn voice_cancellation_only_when_not_muted() {
        let opts = ExportOptions {
            mute: false,
            cancel_male_voice: true,
        };
        assert_eq!(opts.audio_policy(), AudioPolicy::CancelVoice);
        assert_eq!(ExportOptions::default().audio_policy(), AudioPolicy::Original);
    }

    #[test]
    fn only_literal_true_is_true() {
        assert!(parse_flag(Some("true")));
        assert!(!parse_flag(Some("True")));
        assert!(!parse_flag(Some("1")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(None));
    }
}
