use serde::{Deserialize, Serialize};

const MAX_PERCENT: f64 = 100.0;
const MAX_TONE_SCORE: f64 = 1.0;
const MAX_RESPONSE_TIME_SECS: f64 = 10.0;

fn clamp_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, MAX_PERCENT)
}

fn clamp_tone_score(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, MAX_TONE_SCORE)
}

fn clamp_response_time(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, MAX_RESPONSE_TIME_SECS)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationType {
    TruePositive,
    TrueNegative,
    FalsePositive,
    FalseNegative,
}

impl ConversationType {
    pub const ALL: [ConversationType; 4] = [
        ConversationType::TruePositive,
        ConversationType::TrueNegative,
        ConversationType::FalsePositive,
        ConversationType::FalseNegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::TruePositive => "true-positive",
            ConversationType::TrueNegative => "true-negative",
            ConversationType::FalsePositive => "false-positive",
            ConversationType::FalseNegative => "false-negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Agent,
    Customer,
}

impl Speaker {
    pub fn prefix(&self) -> &'static str {
        match self {
            Speaker::Agent => "Agent: ",
            Speaker::Customer => "Customer: ",
        }
    }

    pub fn line(&self, text: &str) -> String {
        format!("{}{}", self.prefix(), text)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SentimentScores {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl SentimentScores {
    // Per-field bound only; the three shares are not forced to sum to 100.
    pub fn clamped(self) -> Self {
        Self {
            positive: clamp_percent(self.positive),
            neutral: clamp_percent(self.neutral),
            negative: clamp_percent(self.negative),
        }
    }

    pub fn in_bounds(&self) -> bool {
        [self.positive, self.neutral, self.negative]
            .iter()
            .all(|value| value.is_finite() && (0.0..=MAX_PERCENT).contains(value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToneSeries {
    pub scores: Vec<f64>,
    pub timestamps: Vec<f64>,
}

impl ToneSeries {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn push_spaced(&mut self, score: f64, gap_secs: f64) {
        let at = match self.timestamps.last() {
            Some(last) => last + gap_secs,
            None => 0.0,
        };
        self.scores.push(clamp_tone_score(score));
        self.timestamps.push(at);
    }

    // Paired lengths, finite values, scores in [0,1], timestamps non-decreasing.
    pub fn is_consistent(&self) -> bool {
        if self.scores.len() != self.timestamps.len() {
            return false;
        }
        let scores_ok = self
            .scores
            .iter()
            .all(|score| score.is_finite() && (0.0..=MAX_TONE_SCORE).contains(score));
        let stamps_ok = self.timestamps.iter().all(|ts| ts.is_finite())
            && self.timestamps.windows(2).all(|pair| pair[0] <= pair[1]);
        scores_ok && stamps_ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub response_time: f64,
    pub talking_ratio: f64,
    pub interruptions: u32,
    pub cuss_words: u32,
    pub escalation_rate: f64,
    pub resolution_rate: f64,
}

impl AgentMetrics {
    pub fn clamped(self) -> Self {
        Self {
            response_time: clamp_response_time(self.response_time),
            talking_ratio: clamp_percent(self.talking_ratio),
            interruptions: self.interruptions,
            cuss_words: self.cuss_words,
            escalation_rate: clamp_percent(self.escalation_rate),
            resolution_rate: clamp_percent(self.resolution_rate),
        }
    }

    pub fn in_bounds(&self) -> bool {
        clamp_response_time(self.response_time) == self.response_time
            && clamp_percent(self.talking_ratio) == self.talking_ratio
            && clamp_percent(self.escalation_rate) == self.escalation_rate
            && clamp_percent(self.resolution_rate) == self.resolution_rate
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmotionTraits {
    pub joy: f64,
    pub sadness: f64,
    pub anger: f64,
    pub fear: f64,
    pub surprise: f64,
}

impl EmotionTraits {
    pub fn clamped(self) -> Self {
        Self {
            joy: clamp_percent(self.joy),
            sadness: clamp_percent(self.sadness),
            anger: clamp_percent(self.anger),
            fear: clamp_percent(self.fear),
            surprise: clamp_percent(self.surprise),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetrics {
    pub sentiment: SentimentScores,
    pub tone_analysis: ToneSeries,
    pub agent_metrics: AgentMetrics,
    pub conversation_type: Option<ConversationType>,
    pub emotion_traits: Option<EmotionTraits>,
    pub summary: String,
    pub transcript: Vec<String>,
    pub current_time: f64,
    pub duration: f64,
}

impl ConversationMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
