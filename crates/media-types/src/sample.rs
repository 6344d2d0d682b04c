use bytes::Bytes;

/// Random-access classification of a sample, following the SAP kinds of
/// ISOBMFF 8.6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RapKind {
    /// Not a random access point.
    #[default]
    None,
    /// A sync sample (SAP type 1, e.g. an IDR frame).
    Sync,
    /// A shadow sync sample (an alternate decode entry for a regular sample).
    SyncShadow,
    /// SAP type 1 signalled explicitly.
    Sap1,
    /// SAP type 2.
    Sap2,
    /// SAP type 3 (open GOP entry).
    Sap3,
}

impl RapKind {
    /// True for any kind that allows starting decode at this sample.
    #[must_use]
    pub fn is_rap(self) -> bool {
        !matches!(self, RapKind::None)
    }
}

/// One byte range inside a sample payload, used when a sample aggregates
/// independent blobs (the TTML document plus its embedded resources).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubSample {
    /// Length of the range in bytes. Ranges are contiguous from offset 0.
    pub size: u32,
}

/// One access unit leaving the core.
///
/// `dts` is strictly increasing per stream; `cts() = dts + cts_offset` and
/// after final CTS packing every `cts_offset` is non-negative.
#[derive(Debug, Clone, Default)]
pub struct MediaSample {
    /// The payload. Moved into the sink on acceptance.
    pub data: Bytes,
    /// Decode timestamp in the stream timescale.
    pub dts: u64,
    /// Composition offset. May be a provisional value (raw picture order
    /// count) until the importer's end-of-stream packing pass.
    pub cts_offset: i64,
    /// Random-access classification.
    pub rap: RapKind,
    /// Duration in timescale units when the importer knows it.
    pub duration: Option<u32>,
    /// Ordered byte-range split of `data`; empty for plain samples.
    pub subsamples: Vec<SubSample>,
    /// When emitting by reference, the absolute source offset of `data`.
    pub data_ref: Option<u64>,
}

impl MediaSample {
    /// A sample with payload, decode time and RAP flag set.
    pub fn new(data: impl Into<Bytes>, dts: u64, rap: RapKind) -> Self {
        MediaSample {
            data: data.into(),
            dts,
            rap,
            ..Default::default()
        }
    }

    /// Composition timestamp.
    #[must_use]
    pub fn cts(&self) -> i64 {
        self.dts as i64 + self.cts_offset
    }
}
