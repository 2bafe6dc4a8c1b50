//! # Identity Flows
//!
//! Login and registration flows observed through the harness: the trigger
//! plays the system under test, publishing identity events the way the
//! real identity service would.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{Fixture, IDENTITY_TOPIC};
    use probe_harness::{AbsenceOptions, ProbeError, WaitOptions};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_login_event_arrives_after_slow_trigger() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();

        let message = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(20_000)),
                || async move {
                    // Browser round trip before the service emits the event.
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    publisher.publish_json(
                        IDENTITY_TOPIC,
                        &json!({"type": "USER_LOGIN", "referenceId": "D1"}),
                    );
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(message.event_type(), Some("USER_LOGIN"));
        assert_eq!(message.reference_id(), Some("D1"));
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_resolves_at_event_time_not_trigger_end() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();
        let started = Instant::now();

        let message = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(20_000)),
                || async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    publisher.publish_json(IDENTITY_TOPIC, &json!({"type": "USER_LOGIN"}));
                    // Browser keeps navigating after the login lands.
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert!(message.matches_type("USER_LOGIN"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_trigger_times_out_at_deadline() {
        let fixture = Fixture::new();
        let started = Instant::now();

        let err = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(1_000)),
                || std::future::pending::<anyhow::Result<()>>(),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed < Duration::from_millis(2_000));
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_events_end_in_timeout() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();
        let started = Instant::now();

        let err = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(1_000)),
                || async move {
                    publisher.publish_json(IDENTITY_TOPIC, &json!({"type": "USER_CREATED"}));
                    publisher.publish_json(IDENTITY_TOPIC, &json!({"type": "USER_LOGOUT"}));
                    Ok(())
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains(IDENTITY_TOPIC));
        assert!(started.elapsed() >= Duration::from_millis(1_000));
        assert!(fixture.consumers_released().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_does_not_log_user_in() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();

        fixture
            .probe
            .assert_no_message(
                IDENTITY_TOPIC,
                AbsenceOptions::of_type("USER_LOGIN").with_window(Duration::from_millis(500)),
                || async move {
                    publisher.publish_json(
                        IDENTITY_TOPIC,
                        &json!({"type": "USER_CREATED", "referenceId": "alice"}),
                    );
                    Ok(())
                },
            )
            .await
            .unwrap();

        // Awaited teardown: nothing left open once the call returns.
        assert_eq!(fixture.broker.open_consumer_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_forbidden_event_inside_window_is_caught() {
        let fixture = Fixture::new();
        let publisher = fixture.broker.clone();

        let err = fixture
            .probe
            .assert_no_message(
                IDENTITY_TOPIC,
                AbsenceOptions::of_type("USER_LOGIN").with_window(Duration::from_millis(500)),
                || async move {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        publisher.publish_json(
                            IDENTITY_TOPIC,
                            &json!({"type": "USER_LOGIN", "referenceId": "mallory"}),
                        );
                    });
                    Ok(())
                },
            )
            .await
            .unwrap_err();

        let offending = err.violating_message().unwrap();
        assert_eq!(offending.reference_id(), Some("mallory"));
        assert!(matches!(err, ProbeError::AssertionViolation { .. }));
        assert_eq!(fixture.broker.open_consumer_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_consumer_bootstrap_recovers() {
        let fixture = Fixture::new();
        fixture.broker.fail_next_consumer_connects(3);
        let publisher = fixture.broker.clone();

        let message = fixture
            .probe
            .wait_for_type(IDENTITY_TOPIC, "USER_LOGIN", || async move {
                publisher.publish_json(IDENTITY_TOPIC, &json!({"type": "USER_LOGIN"}));
                Ok(())
            })
            .await
            .unwrap();

        assert!(message.matches_type("USER_LOGIN"));

        let groups = fixture.broker.consumer_groups();
        assert_eq!(groups.len(), 4);
        assert!(groups[3].ends_with("-group-4"));
        for (attempt, group) in groups.iter().enumerate() {
            assert!(group.ends_with(&format!("-group-{}", attempt + 1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trigger_is_final() {
        let fixture = Fixture::new();
        let late_publisher = fixture.broker.clone();

        let err = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::of_type("USER_LOGIN").with_timeout(Duration::from_millis(1_000)),
                || async move {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        late_publisher
                            .publish_json(IDENTITY_TOPIC, &json!({"type": "USER_LOGIN"}));
                    });
                    Err(anyhow::anyhow!("submit button not found"))
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Trigger { .. }));
        assert!(err.to_string().contains("submit button not found"));
        assert_eq!(fixture.broker.open_consumer_connections(), 0);

        // Neither the late publish nor the old deadline reach the caller.
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(fixture.broker.record_count(IDENTITY_TOPIC), 1);
        assert_eq!(fixture.broker.open_consumer_connections(), 0);
    }

    #[tokio::test]
    async fn test_match_on_custom_fields() {
        let fixture = Fixture::new();
        let probe = fixture.probe.clone();

        let message = fixture
            .probe
            .wait_for_message(
                IDENTITY_TOPIC,
                WaitOptions::matching(|m| {
                    m.matches_type("USER_LOGIN") && m.domain_id() == Some("realm-b")
                }),
                || async move {
                    probe
                        .publish(
                            IDENTITY_TOPIC,
                            &json!({"type": "USER_LOGIN", "domainId": "realm-a"}),
                        )
                        .await?;
                    probe
                        .publish(
                            IDENTITY_TOPIC,
                            &json!({"type": "USER_LOGIN", "domainId": "realm-b", "ipAddress": "10.0.0.7"}),
                        )
                        .await?;
                    Ok::<_, anyhow::Error>(())
                },
            )
            .await
            .unwrap();

        assert_eq!(message.get_str("ipAddress"), Some("10.0.0.7"));
        assert_eq!(fixture.broker.open_producer_connections(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_provisioning() {
        let fixture = Fixture::new();
        fixture.broker.set_reachable(false);

        let err = fixture
            .probe
            .assert_no_type(IDENTITY_TOPIC, "USER_LOGIN", || async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Provisioning { .. }));
        assert_eq!(fixture.broker.open_admin_connections(), 0);
    }
}
