use tokio::sync::watch;

use crate::ingest::Candidate;

/// Receives ranked snapshots of the candidate pool as it grows.
pub trait CandidateSink: Send + Sync {
    fn publish(&self, snapshot: &[Candidate]);
}

/// Keeps only the latest snapshot; slow readers skip intermediate ones.
pub struct WatchSink {
    tx: watch::Sender<Vec<Candidate>>,
}

impl WatchSink {
    pub fn channel() -> (Self, watch::Receiver<Vec<Candidate>>) {
        let (tx, rx) = watch::channel(Vec::new());
        (Self { tx }, rx)
    }
}

impl CandidateSink for WatchSink {
    fn publish(&self, snapshot: &[Candidate]) {
        self.tx.send_replace(snapshot.to_vec());
    }
}
