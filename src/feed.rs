use anyhow::Result;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::debug;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tick {
    pub time: u64,
    pub token: String,
    pub ltp: Decimal,
}

/// Drifting last-traded price, +/- 0.90 per tick in paise steps.
#[derive(Clone, Debug)]
pub struct RandomWalkFeed {
    token: String,
    ltp: Decimal,
}

impl RandomWalkFeed {
    pub fn new(token: &str, start_price: Decimal) -> Self {
        Self {
            token: token.to_string(),
            ltp: start_price,
        }
    }

    pub fn next_tick(&mut self, time: u64) -> Tick {
        let paise: i64 = rand::rng().random_range(-90..=90);
        self.ltp += Decimal::new(paise, 2);
        Tick {
            time,
            token: self.token.clone(),
            ltp: self.ltp,
        }
    }
}

/// Reads ticks back from a JSON-lines file produced by `TickRecorder`.
pub struct ReplayFeed {
    lines: Lines<BufReader<File>>,
}

impl ReplayFeed {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        let lines = BufReader::new(file).lines();
        Ok(Self { lines })
    }

    pub async fn next_tick(&mut self) -> Option<Tick> {
        while let Ok(Some(line)) = self.lines.next_line().await {
            match serde_json::from_str::<Tick>(&line) {
                Ok(tick) => return Some(tick),
                Err(err) => {
                    debug!("Could not parse tick line : {err}");
                }
            }
        }
        None
    }
}

pub struct TickRecorder {
    file: File,
}

impl TickRecorder {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        Ok(Self { file })
    }

    pub async fn record(&mut self, tick: &Tick) -> Result<()> {
        let mut line = serde_json::to_string(tick)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn random_walk_moves_in_bounded_steps() {
        let mut feed = RandomWalkFeed::new("26000", dec!(22000));
        let mut previous = dec!(22000);
        for time in 0..200 {
            let tick = feed.next_tick(time);
            let step = (tick.ltp - previous).abs();
            assert!(step <= dec!(0.90), "step {} out of range", step);
            assert!(tick.ltp.scale() <= 2);
            previous = tick.ltp;
        }
    }

    #[tokio::test]
    async fn record_then_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.jsonl");

        let mut recorder = TickRecorder::create(&path).await.unwrap();
        let mut feed = RandomWalkFeed::new("26009", dec!(48000));
        let mut written = Vec::new();
        for time in 1..=5 {
            let tick = feed.next_tick(time);
            recorder.record(&tick).await.unwrap();
            written.push(tick);
        }
        drop(recorder);

        let mut replay = ReplayFeed::open(&path).await.unwrap();
        let mut read = Vec::new();
        while let Some(tick) = replay.next_tick().await {
            read.push(tick);
        }
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn replay_skips_unparseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.jsonl");
        let good = Tick {
            time: 7,
            token: "26000".to_string(),
            ltp: dec!(22010.55),
        };
        let content = format!("not json\n{}\n", serde_json::to_string(&good).unwrap());
        std::fs::write(&path, content).unwrap();

        let mut replay = ReplayFeed::open(&path).await.unwrap();
        assert_eq!(replay.next_tick().await, Some(good));
        assert_eq!(replay.next_tick().await, None);
    }
}
