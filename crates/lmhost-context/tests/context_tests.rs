//! Integration tests for lmhost-context.
//!
//! Validates:
//! - The `committed <= len <= capacity` invariant across every operation
//! - Sliding window truncation semantics and keep-size fallbacks
//! - Truncation idempotence
//! - Score cache retention modes, defensive copies, and lock-step shifting

use lmhost_context::*;

fn check_invariant(buf: &TokenBuffer) {
    assert!(buf.committed() <= buf.len());
    assert!(buf.len() <= buf.capacity());
}

#[test]
fn invariant_holds_across_operations() {
    let mut buf = TokenBuffer::new(10);
    check_invariant(&buf);
    buf.append(&[1, 2, 3, 4, 5]).unwrap();
    check_invariant(&buf);
    buf.advance(3);
    check_invariant(&buf);
    buf.push(6).unwrap();
    check_invariant(&buf);
    buf.truncate(4);
    check_invariant(&buf);
    buf.clear();
    check_invariant(&buf);
}

#[test]
fn append_fails_when_window_would_overflow() {
    let mut buf = TokenBuffer::new(4);
    buf.append(&[1, 2, 3]).unwrap();
    let err = buf.append(&[4, 5]).unwrap_err();
    assert!(matches!(err, ContextError::CapacityExceeded { .. }));
    // Failed append leaves the buffer untouched.
    assert_eq!(buf.tokens(), &[1, 2, 3]);
}

#[test]
fn truncation_keeps_trailing_tokens_and_resets_cursor() {
    // Buffer at length 9 of capacity 10, keep 4 -> len 4, committed 4.
    let mut buf = TokenBuffer::new(10);
    buf.append(&[10, 11, 12, 13, 14, 15, 16, 17, 18]).unwrap();
    buf.advance(9);
    let keep = buf.truncate(4);
    assert_eq!(keep, 4);
    assert_eq!(buf.len(), 4);
    assert_eq!(buf.committed(), 4);
    assert_eq!(buf.tokens(), &[15, 16, 17, 18]);
    // Room for one more append now.
    buf.push(19).unwrap();
    assert_eq!(buf.len(), 5);
}

#[test]
fn truncation_is_idempotent_at_keep_size() {
    let mut buf = TokenBuffer::new(10);
    buf.append(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    buf.truncate(4);
    let snapshot = buf.tokens().to_vec();
    buf.truncate(4);
    buf.truncate(4);
    assert_eq!(buf.tokens(), snapshot.as_slice());
    assert_eq!(buf.len(), 4);
    assert_eq!(buf.committed(), 4);
}

#[test]
fn degenerate_keep_falls_back_to_half_window() {
    let mut buf = TokenBuffer::new(8);
    buf.append(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(buf.truncate(0), 4);
    assert_eq!(buf.len(), 4);

    let mut buf = TokenBuffer::new(8);
    buf.append(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(buf.truncate(8), 4);
}

#[test]
fn last_n_returns_trailing_window() {
    let mut buf = TokenBuffer::new(8);
    buf.append(&[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(buf.last_n(2), &[4, 5]);
    assert_eq!(buf.last_n(0), &[] as &[i32]);
    // Window larger than the buffer returns everything.
    assert_eq!(buf.last_n(100), &[1, 2, 3, 4, 5]);
}

#[test]
fn uncommitted_suffix_shrinks_as_cursor_advances() {
    let mut buf = TokenBuffer::new(8);
    buf.append(&[1, 2, 3, 4]).unwrap();
    assert_eq!(buf.uncommitted(), &[1, 2, 3, 4]);
    buf.advance(2);
    assert_eq!(buf.uncommitted(), &[3, 4]);
    buf.advance(2);
    assert!(buf.uncommitted().is_empty());
}

#[test]
fn last_only_cache_overwrites_single_slot() {
    let mut cache = ScoreCache::new(Retention::LastOnly, 3, 10);
    cache.save(&[0.1, 0.2, 0.3], 0);
    cache.save(&[0.4, 0.5, 0.6], 7);
    assert_eq!(cache.read(), vec![0.4, 0.5, 0.6]);
    assert!(cache.read_at(7).is_none());
}

#[test]
fn read_returns_defensive_copy() {
    let mut cache = ScoreCache::new(Retention::LastOnly, 2, 4);
    cache.save(&[1.0, 2.0], 0);
    let mut copy = cache.read();
    copy[0] = 99.0;
    assert_eq!(cache.read(), vec![1.0, 2.0]);
}

#[test]
fn all_positions_cache_retains_history() {
    let mut cache = ScoreCache::new(Retention::AllPositions, 2, 4);
    cache.save(&[1.0, 0.0], 0);
    cache.save(&[0.0, 1.0], 1);
    assert_eq!(cache.read(), vec![0.0, 1.0]);
    assert_eq!(cache.read_at(0), Some(&[1.0, 0.0][..]));
    assert_eq!(cache.read_at(1), Some(&[0.0, 1.0][..]));
    assert!(cache.read_at(2).is_none());
}

#[test]
fn update_overwrites_current_distribution() {
    let mut cache = ScoreCache::new(Retention::AllPositions, 2, 4);
    cache.save(&[1.0, 2.0], 0);
    cache.update(&[3.0, 4.0]);
    assert_eq!(cache.read(), vec![3.0, 4.0]);
    assert_eq!(cache.read_at(0), Some(&[3.0, 4.0][..]));
}

#[test]
fn cache_shifts_in_lock_step_with_buffer_truncation() {
    let mut buf = TokenBuffer::new(4);
    let mut cache = ScoreCache::new(Retention::AllPositions, 2, 4);
    buf.append(&[10, 20, 30, 40]).unwrap();
    for pos in 0..4 {
        cache.save(&[pos as f32, 0.0], pos);
    }

    let before = buf.len();
    let keep = buf.truncate(2);
    cache.shift(before - keep);

    // Position i in both structures still refers to the same token.
    assert_eq!(buf.tokens(), &[30, 40]);
    assert_eq!(cache.read_at(0), Some(&[2.0, 0.0][..]));
    assert_eq!(cache.read_at(1), Some(&[3.0, 0.0][..]));
    assert!(cache.read_at(2).is_none());
}

#[test]
fn last_only_cache_ignores_shift() {
    let mut cache = ScoreCache::new(Retention::LastOnly, 2, 4);
    cache.save(&[5.0, 6.0], 3);
    cache.shift(2);
    assert_eq!(cache.read(), vec![5.0, 6.0]);
}
