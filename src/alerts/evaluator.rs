//! Stateful predicates over probe responses.
//!
//! Evaluator kinds are a closed set; construction goes through
//! [`Evaluator::from_record`], keyed by the record's string tag, so an
//! unknown tag can never materialize a half-configured rule.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::records::AlertRuleRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorKind {
    Cpu,
}

impl EvaluatorKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cpu" => Some(Self::Cpu),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
        }
    }
}

/// One evaluator instance bound to an alert rule.
#[derive(Debug, Clone)]
pub enum Evaluator {
    Cpu(CpuAverage),
}

impl Evaluator {
    /// Build an evaluator from a rule record. `None` when the kind tag is
    /// unknown or the parameters do not parse.
    pub fn from_record(record: &AlertRuleRecord) -> Option<Self> {
        match EvaluatorKind::from_tag(&record.kind)? {
            EvaluatorKind::Cpu => {
                let threshold: f64 = record.value.parse().ok()?;
                Some(Self::Cpu(CpuAverage::new(record.count, threshold)))
            }
        }
    }

    pub fn kind(&self) -> EvaluatorKind {
        match self {
            Self::Cpu(_) => EvaluatorKind::Cpu,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "CPU",
        }
    }

    /// Feed one probe response; `true` when the rule condition holds.
    pub fn evaluate(&mut self, response: &str) -> bool {
        match self {
            Self::Cpu(cpu) => cpu.evaluate(response),
        }
    }

    /// Current evaluator value, as persisted on fired alerts.
    pub fn value(&self) -> String {
        match self {
            Self::Cpu(cpu) => format!("{}", cpu.mean()),
        }
    }

    /// Rendered notification body.
    pub fn message(&self) -> String {
        match self {
            Self::Cpu(cpu) => format!("CPU Usage: {}", cpu.mean()),
        }
    }

    /// Patch parameters in place when the record carries the same kind,
    /// keeping the rolling state. `false` when the parameters do not parse.
    pub fn reconfigure(&mut self, record: &AlertRuleRecord) -> bool {
        match self {
            Self::Cpu(cpu) => {
                let Ok(threshold) = record.value.parse() else {
                    return false;
                };
                cpu.reconfigure(record.count, threshold);
                true
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CpuReading {
    #[serde(default)]
    error: String,
    procent: f64,
}

/// Rolling-window mean over reported CPU percentages.
#[derive(Debug, Clone)]
pub struct CpuAverage {
    window: usize,
    threshold: f64,
    readings: VecDeque<f64>,
}

impl CpuAverage {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            window,
            threshold,
            readings: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn reconfigure(&mut self, window: usize, threshold: f64) {
        self.window = window;
        self.threshold = threshold;
        while self.readings.len() > self.window {
            self.readings.pop_front();
        }
    }

    /// Mean over the window; zero until the window has filled.
    fn mean(&self) -> f64 {
        if self.readings.is_empty() || self.readings.len() < self.window {
            return 0.0;
        }
        self.readings.iter().sum::<f64>() / self.readings.len() as f64
    }

    fn evaluate(&mut self, response: &str) -> bool {
        let reading: CpuReading = match serde_json::from_str(response) {
            Ok(reading) => reading,
            Err(_) => return false,
        };
        if !reading.error.is_empty() {
            return false;
        }

        if self.readings.len() >= self.window && !self.readings.is_empty() {
            self.readings.pop_front();
        }
        self.readings.push_back(reading.procent);

        if self.readings.len() < self.window {
            return false;
        }
        self.mean() > self.threshold
    }
}
