use chrono::{SecondsFormat, Utc};
use serde_json::json;

use fabric_api::Record;

pub const DEVICES: [&str; 5] = ["CNC-001", "CNC-002", "ROBOT-A", "ROBOT-B", "PRESS-04"];
/// Six parts OK to one part WARNING.
const STATUSES: [&str; 7] = ["OK", "OK", "OK", "OK", "OK", "OK", "WARNING"];

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Uniform in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.next_intn(items.len())]
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sensor generator
// ═══════════════════════════════════════════════════════════════

/// Simulated shop-floor sensors.
///
/// Temperature is drawn from 60..95 and vibration from 0.1..5.0, so roughly
/// 4% of readings exceed the vibration limit and get discarded downstream.
pub struct SensorGenerator {
    rng: Rng,
}

impl SensorGenerator {
    pub fn new(seed: i64) -> Self {
        Self { rng: Rng::new(seed) }
    }

    pub fn generate(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.reading()).collect()
    }

    fn reading(&mut self) -> Record {
        let value = json!({
            "event_id": uuid::Uuid::new_v4().to_string(),
            "device_id": self.rng.pick(&DEVICES),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            "temperature": self.rng.uniform(60.0, 95.0),
            "vibration": self.rng.uniform(0.1, 5.0),
            "status": self.rng.pick(&STATUSES),
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => Record::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::check;
    use fabric_api::record::number_field;

    #[test]
    fn readings_are_well_formed() {
        let batch = SensorGenerator::new(7).generate(200);
        assert_eq!(batch.len(), 200);
        for r in &batch {
            let t = number_field(r, "temperature").unwrap();
            assert!((60.0..95.0).contains(&t));
            let v = number_field(r, "vibration").unwrap();
            assert!((0.1..5.0).contains(&v));
            assert!(DEVICES.contains(&r["device_id"].as_str().unwrap()));
            // only the vibration limit can reject a generated reading
            for violation in check(r) {
                assert!(matches!(violation, crate::validate::Violation::VibrationTooHigh(_)));
            }
        }
    }

    #[test]
    fn event_ids_are_unique() {
        let batch = SensorGenerator::new(1).generate(50);
        let mut ids: Vec<&str> = batch.iter().map(|r| r["event_id"].as_str().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn same_seed_same_readings() {
        let mut a = Rng::new(42);
        let mut b = Rng::new(42);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }
}
