/// Returned when SSZ encoding, decoding or merkleization fails.
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// No usable value was supplied: the type of the input cannot be recovered (e.g. a
    /// recursive pointer descriptor whose schema has been dropped).
    UntypedNil,
    /// A codec could not be built for this shape, or a value does not fit the descriptor
    /// it is being processed under.
    UnsupportedType(String),
    /// The input ended before a decode step could complete.
    Truncated { len: usize, expected: usize },
    /// A decoded offset points outside the enclosing frame, or into its own offset table.
    OffsetOutOfBounds(u64),
    /// A decoded offset is smaller than the offset preceding it.
    NonMonotonicOffsets(u64),
    /// The unmarshal destination is not a pointer-shaped value where one is required.
    NonPointerDestination,
    /// The unmarshal destination pointer cannot instantiate its referent.
    NilPointerDestination,
    /// Capacity hashing was invoked on a value that is not a list kind.
    NonListForCapacity,
    /// The hashing engine failed outside of its own control (e.g. a concurrent
    /// computation was dropped before producing a result).
    HashFailure(String),
    /// The given bytes were invalid for some application-level reason.
    BytesInvalid(String),
    /// More chunks were supplied than the merkleization limit allows.
    ChunkCountExceedsLimit { limit: u64, len: u64 },
}
