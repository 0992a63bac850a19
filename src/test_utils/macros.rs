/// Advances a progress stream until a snapshot matches `$pattern` (and the optional guard),
/// panicking if none arrives within the timeout. Evaluates to the matching snapshot.
#[macro_export]
macro_rules! assert_progress {
    ($stream: expr, $pattern: pat $(if $guard: expr)?) => {
        $crate::assert_progress!($stream, $pattern $(if $guard)?, timeout = 5)
    };
    ($stream: expr, $pattern: pat $(if $guard: expr)?, timeout = $secs: expr) => {{
        let wait = async {
            loop {
                match tokio_stream::StreamExt::next(&mut $stream).await {
                    std::option::Option::Some(progress) => {
                        if matches!(&progress, $pattern $(if $guard)?) {
                            break progress;
                        }
                    }
                    std::option::Option::None => {
                        panic!("Progress stream closed before matching {}", stringify!($pattern));
                    }
                }
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs($secs), wait)
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {}", stringify!($pattern)))
    }};
}

/// Asserts that the scanner's output directory holds exactly `$expected` unique events.
#[macro_export]
macro_rules! assert_event_count {
    ($output_dir: expr, $expected: expr) => {
        let events = $crate::load_event_set($output_dir).expect("failed to load event set");
        assert_eq!(
            events.len(),
            $expected,
            "Expected {} unique events, found {}",
            $expected,
            events.len()
        );
    };
}
