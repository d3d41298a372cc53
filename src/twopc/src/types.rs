use std::fmt;

/// Reserved payload field carrying the transaction id.
///
/// The field travels inside the same flat JSON map as user data, and
/// `apply` merges the full payload into the store. A client key named
/// `trid` would therefore be overwritten by the transaction id.
pub const TRID_FIELD: &str = "trid";

/// Transaction identifier issued by a coordinator.
///
/// Packed as `(counter << 16) | port` where `counter` is the issuing
/// node's monotonically increasing allocation counter and `port` is its
/// listening port. Ids are unique per issuing node and locally monotonic,
/// but carry no global order across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(i64);

impl TransactionId {
    pub fn pack(counter: i64, port: u16) -> Self {
        TransactionId((counter << 16) | port as i64)
    }

    pub fn from_raw(raw: i64) -> Self {
        TransactionId(raw)
    }

    /// Parse the decimal wire form used in JSON bodies.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().map(TransactionId)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn counter(&self) -> i64 {
        self.0 >> 16
    }

    pub fn port(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Decimal wire form, as carried in the `trid` field.
    pub fn wire(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "{}-{}", self.counter(), self.port())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let trid = TransactionId::pack(5, 24001);
        assert_eq!(trid.counter(), 5);
        assert_eq!(trid.port(), 24001);
        assert_eq!(trid.raw(), (5i64 << 16) | 24001);
    }

    #[test]
    fn test_display_counter_port() {
        let trid = TransactionId::pack(12, 24003);
        assert_eq!(trid.to_string(), "12-24003");
        assert_eq!(TransactionId::from_raw(-1).to_string(), "-1");
    }

    #[test]
    fn test_wire_round_trip() {
        let trid = TransactionId::pack(7, 24002);
        assert_eq!(TransactionId::parse(&trid.wire()), Some(trid));
        assert_eq!(TransactionId::parse("not a number"), None);
    }

    #[test]
    fn test_first_id_is_port() {
        // counter starts at zero, so the first id a node allocates is its port
        assert_eq!(TransactionId::pack(0, 24001).raw(), 24001);
    }
}
