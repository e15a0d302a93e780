use rand::{seq::SliceRandom, Rng};

use crate::metrics::{AgentMetrics, ConversationMetrics, ConversationType, SentimentScores, Speaker};

const PROGRESS_INCREMENT: u32 = 5;
const PROGRESS_TARGET: u32 = 100;
const TONE_SAMPLE_STRIDE: u32 = 10;
const TRANSCRIPT_STRIDE: u32 = 20;
pub const TONE_SAMPLE_GAP_SECS: f64 = 2.0;

const RESPONSE_TIME_CEILING_SECS: f64 = 10.0;
const INTERRUPTIONS_CEILING: f64 = 10.0;
const CUSS_WORDS_CEILING: f64 = 5.0;

const CANNED_UTTERANCES: [&str; 6] = [
    "Hello, how can I help you today?",
    "I've been having trouble with my recent order.",
    "I understand your frustration. Let me look into that for you.",
    "Thank you, I appreciate your help.",
    "Is there anything else I can assist you with?",
    "No, that's all for today. Thank you.",
];

pub const CLOSING_SUMMARY: &str = "In this conversation, the customer service agent demonstrated professional behavior and addressed the customer's concerns effectively. The agent maintained a positive tone throughout the call and provided clear information. The customer initially expressed frustration but was satisfied by the end of the call. The agent successfully resolved the customer's issue without escalation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulationTicker {
    progress: u32,
}

#[derive(Debug, Clone)]
pub struct SimulationStep {
    pub progress: u32,
    pub sentiment: SentimentScores,
    pub agent_metrics: AgentMetrics,
    pub tone_score: Option<f64>,
    pub transcript_line: Option<String>,
    pub finale: Option<SimulationFinale>,
}

#[derive(Debug, Clone)]
pub struct SimulationFinale {
    pub summary: String,
    pub conversation_type: ConversationType,
}

impl SimulationTicker {
    pub fn new() -> Self {
        Self { progress: 0 }
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= PROGRESS_TARGET
    }

    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SimulationStep {
        self.progress = (self.progress + PROGRESS_INCREMENT).min(PROGRESS_TARGET);
        // Progress acts as an upper envelope so early steps stay small.
        let envelope = f64::from(self.progress) / f64::from(PROGRESS_TARGET);

        let sentiment = SentimentScores {
            positive: rng.gen::<f64>() * envelope * 100.0,
            neutral: rng.gen::<f64>() * envelope * 100.0,
            negative: rng.gen::<f64>() * envelope * 100.0,
        }
        .clamped();

        let agent_metrics = AgentMetrics {
            response_time: rng.gen::<f64>() * envelope * RESPONSE_TIME_CEILING_SECS,
            talking_ratio: rng.gen::<f64>() * envelope * 100.0,
            interruptions: (rng.gen::<f64>() * envelope * INTERRUPTIONS_CEILING) as u32,
            cuss_words: (rng.gen::<f64>() * envelope * CUSS_WORDS_CEILING) as u32,
            escalation_rate: rng.gen::<f64>() * envelope * 100.0,
            resolution_rate: rng.gen::<f64>() * envelope * 100.0,
        }
        .clamped();

        let tone_score = if self.progress % TONE_SAMPLE_STRIDE == 0 {
            Some(rng.gen::<f64>())
        } else {
            None
        };

        let transcript_line = if self.progress % TRANSCRIPT_STRIDE == 0 {
            let speaker = if rng.gen_bool(0.5) {
                Speaker::Agent
            } else {
                Speaker::Customer
            };
            let text = CANNED_UTTERANCES
                .choose(rng)
                .copied()
                .unwrap_or(CANNED_UTTERANCES[0]);
            Some(speaker.line(text))
        } else {
            None
        };

        let finale = if self.is_complete() {
            let conversation_type = ConversationType::ALL
                .choose(rng)
                .copied()
                .unwrap_or(ConversationType::TruePositive);
            Some(SimulationFinale {
                summary: CLOSING_SUMMARY.to_string(),
                conversation_type,
            })
        } else {
            None
        };

        SimulationStep {
            progress: self.progress,
            sentiment,
            agent_metrics,
            tone_score,
            transcript_line,
            finale,
        }
    }
}

impl SimulationStep {
    pub fn apply(&self, metrics: &mut ConversationMetrics) {
        metrics.sentiment = self.sentiment;
        metrics.agent_metrics = self.agent_metrics;
        if let Some(score) = self.tone_score {
            metrics.tone_analysis.push_spaced(score, TONE_SAMPLE_GAP_SECS);
        }
        if let Some(line) = &self.transcript_line {
            metrics.transcript.push(line.clone());
        }
        if let Some(finale) = &self.finale {
            metrics.summary = finale.summary.clone();
            metrics.conversation_type = Some(finale.conversation_type);
        }
    }
}
