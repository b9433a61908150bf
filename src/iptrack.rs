//! External-IP prediction from peer statements.
//!
//! Peers occasionally tell us which source address our packets appear to
//! come from ("host h says my IP is a"). The tracker keeps one statement
//! per host inside a sliding window and predicts the external IP as the
//! address stated by a clear majority. It can also tell whether hosts we
//! never contacted are reaching us, which indicates full-cone address
//! translation.
//!
//! Callers supply the clock: every method takes the current time in
//! monotonic seconds, which must never decrease between calls.

use std::collections::HashMap;
use std::net::IpAddr;

/// Default statement expiry window, in seconds.
pub const DEFAULT_WINDOW: u64 = 300;

/// Default contact expiry window, in seconds.
pub const DEFAULT_CONTACT_WINDOW: u64 = 600;

/// Default minimum number of agreeing statements for a prediction.
pub const DEFAULT_MIN_STATEMENTS: usize = 50;

/// Majority-vote tracker for the local node's external IP.
#[derive(Debug, Clone)]
pub struct IpTracker {
    window: u64,
    contact_window: u64,
    min_statements: usize,
    statements: HashMap<IpAddr, (IpAddr, u64)>,
    contacts: HashMap<IpAddr, u64>,
    last_time: u64,
}

impl Default for IpTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CONTACT_WINDOW, DEFAULT_MIN_STATEMENTS)
    }
}

impl IpTracker {
    /// Create a tracker with explicit windows and vote threshold.
    pub fn new(window: u64, contact_window: u64, min_statements: usize) -> Self {
        Self {
            window,
            contact_window,
            min_statements,
            statements: HashMap::new(),
            contacts: HashMap::new(),
            last_time: 0,
        }
    }

    /// Record that `host` claims our external IP is `ip`.
    pub fn add_statement(&mut self, host: IpAddr, ip: IpAddr, now: u64) {
        let now = self.check_time(now);
        self.statements.insert(host, (ip, now));
    }

    /// Record that we just sent a packet to `host`.
    pub fn add_contacted(&mut self, host: IpAddr, now: u64) {
        let now = self.check_time(now);
        self.contacts.insert(host, now);
    }

    /// The IP stated by the majority of hosts within the window, if the
    /// majority is large enough.
    pub fn predict_ip(&mut self, now: u64) -> Option<IpAddr> {
        let now = self.check_time(now);
        self.gc_statements(now);

        let mut counts: HashMap<IpAddr, usize> = HashMap::new();
        let mut best: Option<(usize, IpAddr)> = None;
        for (ip, _) in self.statements.values() {
            let count = counts.entry(*ip).or_insert(0);
            *count += 1;
            if *count >= self.min_statements && best.map_or(true, |(n, _)| *count > n) {
                best = Some((*count, *ip));
            }
        }
        best.map(|(_, ip)| ip)
    }

    /// Whether any host we never contacted has reached us: evidence that
    /// inbound packets pass without a prior outbound hole-punch.
    pub fn predict_full_cone_nat(&mut self, now: u64) -> bool {
        let now = self.check_time(now);
        self.gc_statements(now);
        self.gc_contacts(now);
        self.statements
            .keys()
            .any(|host| !self.contacts.contains_key(host))
    }

    fn check_time(&mut self, now: u64) -> u64 {
        debug_assert!(now >= self.last_time, "time must be monotonic");
        self.last_time = self.last_time.max(now);
        self.last_time
    }

    fn gc_statements(&mut self, now: u64) {
        let window = self.window;
        self.statements.retain(|_, (_, time)| *time + window > now);
    }

    fn gc_contacts(&mut self, now: u64) {
        let window = self.contact_window;
        self.contacts.retain(|_, time| *time + window > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn host(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    const STATED: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

    #[test]
    fn test_majority_prediction() {
        let mut tracker = IpTracker::new(300, 600, 3);

        tracker.add_statement(host(1), STATED, 10);
        tracker.add_statement(host(2), STATED, 11);
        assert_eq!(tracker.predict_ip(12), None); // below threshold

        tracker.add_statement(host(3), STATED, 12);
        tracker.add_statement(host(4), OTHER, 13);
        assert_eq!(tracker.predict_ip(14), Some(STATED));
    }

    #[test]
    fn test_one_statement_per_host() {
        let mut tracker = IpTracker::new(300, 600, 2);

        // a single host repeating itself is one vote, not three
        tracker.add_statement(host(1), STATED, 1);
        tracker.add_statement(host(1), STATED, 2);
        tracker.add_statement(host(1), STATED, 3);
        assert_eq!(tracker.predict_ip(4), None);

        tracker.add_statement(host(2), STATED, 5);
        assert_eq!(tracker.predict_ip(6), Some(STATED));
    }

    #[test]
    fn test_statements_expire() {
        let mut tracker = IpTracker::new(300, 600, 2);

        tracker.add_statement(host(1), STATED, 10);
        tracker.add_statement(host(2), STATED, 20);
        assert_eq!(tracker.predict_ip(30), Some(STATED));

        // the first statement ages out of the window
        assert_eq!(tracker.predict_ip(311), None);
    }

    #[test]
    fn test_full_cone_nat() {
        let mut tracker = IpTracker::new(300, 600, 50);

        tracker.add_contacted(host(1), 10);
        tracker.add_statement(host(1), STATED, 20);
        assert!(!tracker.predict_full_cone_nat(21));

        // a statement from a host we never contacted
        tracker.add_statement(host(2), STATED, 22);
        assert!(tracker.predict_full_cone_nat(23));
    }

    #[test]
    fn test_contacts_expire() {
        let mut tracker = IpTracker::new(1000, 100, 50);

        tracker.add_contacted(host(1), 10);
        tracker.add_statement(host(1), STATED, 20);
        assert!(!tracker.predict_full_cone_nat(30));

        // once the contact expires the statement looks unsolicited
        assert!(tracker.predict_full_cone_nat(150));
    }
}
