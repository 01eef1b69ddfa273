/// Upper bound for a single length-delimited frame on the TCP transport.
///
/// Events carry a URL, a domain and caller metadata, so frames stay small; the
/// bound only exists so a broken peer cannot make the server buffer without limit.
/// Clients and the server must agree on this value.
pub const MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;
