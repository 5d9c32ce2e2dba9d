use std::time::Duration;

use super::RetryPolicy;

#[test]
fn it_doubles_the_delay_per_attempt() {
    let policy = RetryPolicy::new(3, Duration::from_millis(100));

    assert_eq!(policy.delay(0), Duration::from_millis(100));
    assert_eq!(policy.delay(1), Duration::from_millis(200));
    assert_eq!(policy.delay(2), Duration::from_millis(400));
}

#[test]
fn it_saturates_on_large_attempts() {
    let policy = RetryPolicy::new(3, Duration::from_millis(1));
    assert!(policy.delay(40) >= policy.delay(31));
}
