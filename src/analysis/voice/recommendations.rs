// Rule-based practice recommendations
//
// Rules are evaluated in a fixed category order: stability, consistency,
// breathiness, vibrato, then overall quality. Every matching rule
// contributes its messages.

use crate::analysis::voice::vibrato::VibratoInfo;
use crate::analysis::voice::QualityLevel;
use crate::config::VoiceAnalysisConfig;

/// A single piece of practice feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    SlowSustainedPractice,
    SteadyBreathSupport,
    FinePitchControl,
    RegularPractice,
    ReviewRecordings,
    ControlledOnset,
    HummingPractice,
    MetronomeVibrato,
    SlowerVibrato,
    DevelopVibrato,
    FundamentalsFirst,
    ConsiderCoaching,
    MaintainQuality,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::SlowSustainedPractice => {
                "Practice slow, sustained vocalises to build steadier pitch."
            }
            Recommendation::SteadyBreathSupport => {
                "Use diaphragmatic breathing and keep the airflow constant."
            }
            Recommendation::FinePitchControl => {
                "Work on small pitch adjustments to tighten your pitch control."
            }
            Recommendation::RegularPractice => {
                "Keep up regular voice practice to even out volume and tone."
            }
            Recommendation::ReviewRecordings => {
                "Listen back to your recordings to learn your voice's tendencies."
            }
            Recommendation::ControlledOnset => {
                "Your tone is breathy. Focus on a clean, controlled onset."
            }
            Recommendation::HummingPractice => "Practice humming to build a clearer tone.",
            Recommendation::MetronomeVibrato => {
                "Practice vibrato against a metronome to make it more regular."
            }
            Recommendation::SlowerVibrato => {
                "Your vibrato is too fast. Practice a slower, more relaxed vibrato."
            }
            Recommendation::DevelopVibrato => "Try developing a natural vibrato next.",
            Recommendation::FundamentalsFirst => {
                "Start with basic breathing and sustained-tone exercises."
            }
            Recommendation::ConsiderCoaching => {
                "Consider working with a voice teacher for guided feedback."
            }
            Recommendation::MaintainQuality => {
                "Excellent voice quality. Keep practicing to maintain it."
            }
        }
    }
}

/// Evaluate every rule against the component scores
pub(super) fn generate(
    quality: QualityLevel,
    stability: f64,
    vibrato: &VibratoInfo,
    breathiness: Option<f64>,
    consistency: f64,
    config: &VoiceAnalysisConfig,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if stability < 0.5 {
        out.push(Recommendation::SlowSustainedPractice);
        out.push(Recommendation::SteadyBreathSupport);
    } else if stability < 0.7 {
        out.push(Recommendation::FinePitchControl);
    }

    if consistency < 0.5 {
        out.push(Recommendation::RegularPractice);
        out.push(Recommendation::ReviewRecordings);
    }

    if breathiness.is_some_and(|b| b > config.breathiness_threshold) {
        out.push(Recommendation::ControlledOnset);
        out.push(Recommendation::HummingPractice);
    }

    if vibrato.detected {
        if vibrato.regularity.unwrap_or(0.0) < 0.5 {
            out.push(Recommendation::MetronomeVibrato);
        } else if vibrato.rate_hz.unwrap_or(0.0) > config.vibrato_max_rate {
            out.push(Recommendation::SlowerVibrato);
        }
    } else if matches!(quality, QualityLevel::Good | QualityLevel::Excellent) {
        out.push(Recommendation::DevelopVibrato);
    }

    match quality {
        QualityLevel::Poor => {
            out.push(Recommendation::FundamentalsFirst);
            out.push(Recommendation::ConsiderCoaching);
        }
        QualityLevel::Excellent => out.push(Recommendation::MaintainQuality),
        QualityLevel::Good | QualityLevel::Fair => {}
    }

    out
}
