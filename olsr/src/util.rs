/// Compares whether a < b mod 65536, tolerating wraparound
///
/// # Arguments
///
/// * `a`: First one
/// * `b`: Second one
///
/// returns: bool
///
/// # Examples
///
/// ```
/// assert!(olsr::util::seqno_less_than(5, 10000));
/// assert!(olsr::util::seqno_less_than(60000, 61000));
/// assert!(olsr::util::seqno_less_than(65530, 3));
///
/// assert!(!olsr::util::seqno_less_than(20000, 61000));
/// assert!(!olsr::util::seqno_less_than(7, 7));
/// ```
pub fn seqno_less_than(a: u16, b: u16) -> bool {
    let x = b.wrapping_sub(a);
    0 < x && x < 32768
}

/// Compares whether a > b mod 65536
///
/// ```
/// assert!(olsr::util::seqno_greater_than(7, 5));
/// assert!(!olsr::util::seqno_greater_than(5, 7));
/// ```
pub fn seqno_greater_than(a: u16, b: u16) -> bool {
    seqno_less_than(b, a)
}

/// Shortcut for increment mod 2^16
pub fn increment(x: &mut u16) {
    *x = x.wrapping_add(1)
}

/// Distance travelled from `last` to `next` mod 2^16
pub fn seqno_diff(next: u16, last: u16) -> u16 {
    next.wrapping_sub(last)
}
