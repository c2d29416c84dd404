//! In-flight task tuples flowing between pipeline stages. Never persisted.

/// A chapter slot waiting to be fetched.
///
/// An empty `cid` is meaningful only together with a `prev_cid`: the slot
/// is then routed to chain repair instead of the network.
#[derive(Debug, Clone)]
pub(crate) struct CidTask {
    pub prev_cid: Option<String>,
    pub cid: Option<String>,
    pub retry: u32,
    pub vol_idx: usize,
    pub chap_idx: usize,
}

/// Raw pages of one chapter, waiting to be parsed.
#[derive(Debug, Clone)]
pub(crate) struct HtmlTask {
    pub cid: String,
    pub retry: u32,
    pub html_list: Vec<String>,
    pub vol_idx: usize,
    pub chap_idx: usize,
}

/// A chapter slot whose id must be recovered from its predecessor's
/// parsed payload.
#[derive(Debug, Clone)]
pub(crate) struct RestoreTask {
    pub vol_idx: usize,
    pub chap_idx: usize,
    pub prev_cid: String,
}
