//! # Races and Resource Release
//!
//! Match against deadline, many callers against one broker, and the
//! per-call consumer lifecycle.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{Fixture, IDENTITY_TOPIC};
    use futures::future::join_all;
    use probe_harness::{
        AbsenceOptions, DeadlineTimer, ProbeError, Settlement, WaitOptions,
    };
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_match_at_deadline_settles_once() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();

        // Publish exactly when the deadline fires; either side may win,
        // but the caller sees one outcome and both paths release.
        let result = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(100)),
                || async move {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        publisher.publish_json(IDENTITY_TOPIC, &json!({"type": "USER_LOGIN"}));
                    });
                    Ok(())
                },
            )
            .await;

        match result {
            Ok(message) => assert!(message.matches_type("USER_LOGIN")),
            Err(err) => assert!(err.is_timeout(), "unexpected error: {err}"),
        }
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test]
    async fn test_settlement_and_timer_race_from_many_tasks() {
        let (settlement, outcome) = Settlement::<&'static str>::new();
        let timer = DeadlineTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        {
            let settlement = settlement.clone();
            let fired = fired.clone();
            timer.arm(Duration::from_millis(1), move || {
                fired.fetch_add(1, Ordering::SeqCst);
                settlement.settle("timed out");
            });
        }

        let matchers: Vec<_> = (0..8)
            .map(|_| {
                let settlement = settlement.clone();
                let timer = timer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    timer.cancel();
                    settlement.settle("matched")
                })
            })
            .collect();

        let wins = join_all(matchers)
            .await
            .into_iter()
            .filter(|won| matches!(won, Ok(true)))
            .count();
        let value = outcome.await.unwrap();

        match value {
            "matched" => assert_eq!(wins, 1),
            "timed out" => {
                assert_eq!(wins, 0);
                assert_eq!(fired.load(Ordering::SeqCst), 1);
            }
            other => panic!("unexpected outcome {other}"),
        }
        assert!(settlement.is_settled());
    }

    #[tokio::test]
    async fn test_concurrent_waits_use_distinct_identities() {
        let fixture = Fixture::new();
        let topics: Vec<String> = (0..5).map(|i| format!("tenant-{i}-events")).collect();

        let calls = topics.iter().map(|topic| {
            let probe = fixture.probe.clone();
            let publisher = fixture.broker.clone();
            let topic = topic.clone();
            async move {
                let event = json!({"type": "USER_LOGIN", "domainId": topic.clone()});
                let target = topic.clone();
                probe
                    .wait_for_message(&topic, WaitOptions::of_type("USER_LOGIN"), || async move {
                        publisher.publish_json(&target, &event);
                        Ok(())
                    })
                    .await
            }
        });

        let results = join_all(calls).await;
        for (topic, result) in topics.iter().zip(results) {
            let message = result.unwrap();
            assert_eq!(message.domain_id(), Some(topic.as_str()));
        }

        let groups: HashSet<_> = fixture.broker.consumer_groups().into_iter().collect();
        assert_eq!(groups.len(), topics.len());
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test]
    async fn test_wait_and_absence_side_by_side() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();

        let wait = fixture.probe.wait_for_type("logins", "USER_LOGIN", || async move {
            publisher.publish_json("logins", &json!({"type": "USER_LOGIN"}));
            Ok(())
        });
        let absence = fixture.probe.assert_no_message(
            "lockouts",
            AbsenceOptions::of_type("USER_LOCKED").with_window(Duration::from_millis(100)),
            || async { Ok(()) },
        );

        let (waited, absent) = tokio::join!(wait, absence);
        assert!(waited.unwrap().matches_type("USER_LOGIN"));
        absent.unwrap();
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test]
    async fn test_absence_trigger_failure_releases_consumer() {
        let fixture = Fixture::new();

        let err = fixture
            .probe
            .assert_no_type(IDENTITY_TOPIC, "USER_LOGIN", || async {
                Err(anyhow::anyhow!("registration form rejected input"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Trigger { .. }));
        assert_eq!(fixture.broker.open_consumer_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_exhaustion_reports_last_group() {
        let fixture = Fixture::new();
        fixture.broker.fail_next_consumer_connects(10);

        let err = fixture
            .probe
            .wait_for_type(IDENTITY_TOPIC, "USER_LOGIN", || async { Ok(()) })
            .await
            .unwrap_err();

        match err {
            ProbeError::BootstrapExhausted {
                attempts,
                last_group_id,
                ..
            } => {
                assert_eq!(attempts, 10);
                assert!(last_group_id.ends_with("-group-10"));
            }
            other => panic!("expected bootstrap exhaustion, got {other:?}"),
        }
        assert_eq!(fixture.broker.consumer_groups().len(), 10);
        assert_eq!(fixture.broker.open_consumer_connections(), 0);
    }
}
