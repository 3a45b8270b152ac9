use super::scaler::SampleScaler;
use super::table;
use super::waveform::WaveformKind;

/// One precomputed cycle of device words.
///
/// A cache of the parameters it was built from: `revision` records which
/// parameter revision the content matches, so readers can tell when it is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    values: Vec<u16>,
    revision: u64,
}

impl SampleBuffer {
    /// Empty buffer that is stale for every revision
    pub fn empty() -> Self {
        Self {
            values: Vec::new(),
            revision: u64::MAX,
        }
    }

    /// Rebuild the whole cycle for the given parameters
    pub fn regenerate(
        &mut self,
        kind: WaveformKind,
        amplitude: f64,
        mean: f64,
        resolution: usize,
        scaler: &SampleScaler,
        revision: u64,
    ) {
        self.values.clear();
        self.values.extend(
            table::cycle(kind, resolution)
                .into_iter()
                .map(|value| scaler.scale(value, amplitude, mean)),
        );
        self.revision = revision;
    }

    pub fn is_current(&self, revision: u64) -> bool {
        self.revision == revision && !self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.values
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::empty()
    }
}
