use crate::channels::webhook::CallbackClient;
use crate::config::{CallbackConfig, NotifyConfig, SmtpConfig, SmtpSecurity};
use crate::dispatcher::Dispatcher;
use crate::plugin::{ChannelRegistry, Lookup};
use crate::recipients::{resolve, RecipientKind};
use crate::render::{ContentRenderer, RenderConfig, RenderStrategy};
use crate::{DeliveryResult, DeliveryStatus, DispatchReport, RecipientStatus, SendResponse, RecipientResult};
use alertrelay_common::types::{Notice, RecipientUser};
use alertrelay_storage::file::FileAuditStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload(channels: Value, users: Value) -> Value {
    json!({
        "event": {
            "id": 4,
            "rule_id": 1,
            "rule_name": "cpu too high",
            "trigger_time": 1625213114,
            "is_recovery": 0,
            "priority": 1,
            "readable_expression": "cpu.idle < 10",
            "current_value": "cpu.idle: 3.2",
            "tags": ["ident=web-01", "region=bj"],
            "notify_channels": channels,
            "notify_users_obj": users
        }
    })
}

fn notice(channels: Value, users: Value) -> Notice {
    Notice::from_value(payload(channels, users), &Default::default()).unwrap()
}

fn ok_body() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok"}))
}

fn config_for(server: &MockServer) -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.webhook_bases.insert(
        "dingtalk".to_string(),
        format!("{}/robot/send?access_token=", server.uri()),
    );
    config.webhook_bases.insert(
        "wecom".to_string(),
        format!("{}/cgi-bin/webhook/send?key=", server.uri()),
    );
    config.webhook_bases.insert("feishu".to_string(), format!("{}/hook/", server.uri()));
    config
}

fn statuses(report: &DispatchReport) -> Vec<(&str, DeliveryStatus)> {
    report
        .results
        .iter()
        .map(|r| (r.channel.as_str(), r.status))
        .collect()
}

// ---- registry ----

#[test]
fn registry_builds_robot_and_stub_channels_by_default() {
    let registry = ChannelRegistry::from_config(&NotifyConfig::default());
    assert_eq!(registry.channel_names(), vec!["dingtalk", "feishu", "sms", "voice", "wecom"]);
}

#[test]
fn email_without_smtp_is_disabled_not_unknown() {
    let registry = ChannelRegistry::from_config(&NotifyConfig::default());
    match registry.lookup("email") {
        Lookup::Disabled(reason) => assert!(reason.contains("smtp")),
        _ => panic!("expected email to be disabled"),
    }
    assert!(matches!(registry.lookup("pager"), Lookup::Unknown));
}

#[test]
fn configured_aliases_resolve() {
    let mut config = NotifyConfig::default();
    config.aliases.insert("ding".to_string(), "dingtalk".to_string());
    let registry = ChannelRegistry::from_config(&config);
    assert_eq!(registry.canonical_name("Ding"), "dingtalk");
    assert_eq!(registry.canonical_name("weixin"), "wecom");
    assert_eq!(registry.canonical_name("email"), "email");
}

#[test]
fn normalize_channels_dedupes_after_aliasing() {
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default());
    let requested: Vec<String> = ["wecom", "sms", "weixin", "", "SMS", "email"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(dispatcher.normalize_channels(&requested), vec!["wecom", "sms", "email"]);
}

// ---- recipients ----

#[test]
fn contact_tokens_are_deduplicated_and_phones_collected() {
    let users: Vec<RecipientUser> = serde_json::from_value(json!([
        {"id": 1, "phone": "13800000001", "contacts": {"dingtalk_robot_token": "T1"}},
        {"id": 2, "phone": "13800000002", "contacts": {"dingtalk_robot_token": "T1"}},
        {"id": 3, "phone": "", "contacts": {}},
    ]))
    .unwrap();
    let set = resolve(
        &users,
        &RecipientKind::Contact {
            key: "dingtalk_robot_token".to_string(),
            mention_phones: true,
        },
    );
    assert_eq!(set.targets(), ["T1"]);
    assert_eq!(set.mentions(), ["13800000001", "13800000002"]);
}

#[test]
fn users_without_contact_data_resolve_to_empty_set() {
    let users = vec![RecipientUser::default()];
    assert!(resolve(&users, &RecipientKind::Email).is_empty());
    assert!(resolve(&users, &RecipientKind::Phone).is_empty());
}

// ---- rendering ----

#[test]
fn text_rendering_follows_fixed_field_order() {
    let renderer = ContentRenderer::new(RenderConfig {
        utc: true,
        ..Default::default()
    });
    let n = notice(json!("sms"), json!([]));
    let text = renderer.render_text(&n.event);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Alert type: Monitoring alert",
            "Rule: cpu too high",
            "State: Triggered",
            "Priority: P1",
            "Time: 2021-07-02 08:05:14",
            "Expression: cpu.idle < 10",
            "Value: cpu.idle: 3.2",
            "Tags: ident=web-01 | region=bj",
        ]
    );
}

#[test]
fn missing_template_renders_placeholder() {
    let renderer = ContentRenderer::new(RenderConfig {
        strategy: RenderStrategy::Template,
        ..Default::default()
    });
    let n = notice(json!("wecom"), json!([]));
    assert_eq!(renderer.render(&n, "wecom"), "wecom.tpl not found");
}

#[test]
fn auto_strategy_uses_payload_templates() {
    let mut raw = payload(json!("email"), json!([]));
    raw["tpls"] = json!({"email.tpl": "<p>cpu</p>", "subject.tpl": "[P1] cpu"});
    let n = Notice::from_value(raw, &Default::default()).unwrap();
    let renderer = ContentRenderer::new(RenderConfig::default());

    let msg = renderer.message(&n, "email", None);
    assert_eq!(msg.body, "<p>cpu</p>");
    assert_eq!(msg.subject, "[P1] cpu");
    assert!(msg.html);
    assert_eq!(msg.title, "Triggered - cpu too high");
}

// ---- results ----

#[test]
fn mixed_recipient_outcomes_are_partial() {
    let result = DeliveryResult::from_response(
        "email",
        SendResponse {
            recipient_results: vec![
                RecipientResult::success("a@x.io"),
                RecipientResult::failed("b@x.io", "mailbox unavailable"),
            ],
            ..Default::default()
        },
    );
    assert_eq!(result.status, DeliveryStatus::Partial);
    assert_eq!((result.succeeded, result.failed), (1, 1));
    assert_eq!(result.reason.as_deref(), Some("mailbox unavailable"));
}

// ---- dispatch ----

#[tokio::test]
async fn dingtalk_token_receives_exactly_one_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .and(query_param("access_token", "T1"))
        .and(body_partial_json(json!({
            "msgtype": "markdown",
            "markdown": {"title": "Triggered - cpu too high"},
            "at": {"isAtAll": false, "atMobiles": ["13800000001"]}
        })))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&server));
    let n = notice(
        json!("dingtalk"),
        json!([{"id": 1, "phone": "13800000001", "contacts": {"dingtalk_robot_token": "T1"}}]),
    );
    let report = dispatcher.dispatch(&n).await;

    assert_eq!(statuses(&report), vec![("dingtalk", DeliveryStatus::Success)]);
    assert_eq!(report.results[0].succeeded, 1);
    assert_eq!(report.event_id, "4");
    assert_eq!(report.rule_id, "1");
}

#[tokio::test]
async fn shared_wecom_key_is_posted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webhook/send"))
        .and(query_param("key", "K1"))
        .and(body_partial_json(json!({"msgtype": "markdown"})))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&server));
    let n = notice(
        json!("wecom wecom"),
        json!([
            {"id": 1, "contacts": {"wecom_robot_token": "K1"}},
            {"id": 2, "contacts": {"wecom_robot_token": "K1"}}
        ]),
    );
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(statuses(&report), vec![("wecom", DeliveryStatus::Success)]);
}

#[tokio::test]
async fn failing_channel_does_not_affect_siblings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webhook/send"))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&server));
    let n = notice(
        json!(["dingtalk", "wecom"]),
        json!([{"id": 1, "contacts": {"dingtalk_robot_token": "T1", "wecom_robot_token": "K1"}}]),
    );
    let report = dispatcher.dispatch(&n).await;

    assert_eq!(
        statuses(&report),
        vec![("dingtalk", DeliveryStatus::Failed), ("wecom", DeliveryStatus::Success)]
    );
    let ding = &report.results[0];
    assert_eq!(ding.recipients[0].status, RecipientStatus::Failed);
    assert!(ding.reason.as_deref().unwrap_or_default().contains("500"));
}

#[tokio::test]
async fn api_error_code_in_body_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook/F1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 19021, "msg": "sign match fail"})))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&server));
    let n = notice(json!("feishu"), json!([{"id": 1, "contacts": {"feishu_robot_token": "F1"}}]));
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(report.results[0].status, DeliveryStatus::Failed);
    assert!(report.results[0].reason.as_deref().unwrap_or_default().contains("19021"));
}

#[tokio::test]
async fn slow_channel_times_out_without_blocking_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(ok_body().set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&server)).with_timeout(Duration::from_millis(200));
    let n = notice(
        json!("dingtalk sms"),
        json!([{"id": 1, "phone": "13800000001", "contacts": {"dingtalk_robot_token": "T1"}}]),
    );
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(
        statuses(&report),
        vec![("dingtalk", DeliveryStatus::TimedOut), ("sms", DeliveryStatus::Success)]
    );
}

#[tokio::test]
async fn unknown_channel_is_reported_in_order() {
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default());
    let n = notice(json!("pager sms"), json!([{"id": 1, "phone": "13800000001"}]));
    let report = dispatcher.dispatch(&n).await;

    assert_eq!(
        statuses(&report),
        vec![("pager", DeliveryStatus::Unknown), ("sms", DeliveryStatus::Success)]
    );
    assert!(report.summary().contains("1 unknown"));
}

#[tokio::test]
async fn stub_channels_note_that_nothing_was_sent() {
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default());
    let n = notice(json!("voice"), json!([{"id": 1, "phone": "13800000001"}]));
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(report.results[0].status, DeliveryStatus::Success);
    assert!(report.results[0].reason.as_deref().unwrap_or_default().contains("stub"));
}

#[tokio::test]
async fn email_without_addresses_is_skipped() {
    let mut config = NotifyConfig::default();
    config.smtp = Some(SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        username: None,
        password: None,
        from: "alerts@example.com".to_string(),
        security: SmtpSecurity::None,
    });
    let dispatcher = Dispatcher::from_config(&config);
    let n = notice(json!("email"), json!([{"id": 1, "email": ""}]));
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(statuses(&report), vec![("email", DeliveryStatus::Skipped)]);
}

#[tokio::test]
async fn email_without_smtp_fails_with_reason() {
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default());
    let n = notice(json!("email"), json!([{"id": 1, "email": "ops@example.com"}]));
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(report.results[0].status, DeliveryStatus::Failed);
    assert!(report.results[0].reason.as_deref().unwrap_or_default().contains("smtp"));
}

#[tokio::test]
async fn empty_channel_list_still_persists() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileAuditStore::new(dir.path()));
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default()).with_audit(store);
    let n = notice(json!(""), json!([]));
    let report = dispatcher.dispatch(&n).await;

    assert!(report.results.is_empty());
    let persisted = report.persisted.expect("payload persisted");
    let saved: Value = serde_json::from_slice(&std::fs::read(persisted).unwrap()).unwrap();
    assert_eq!(saved, n.raw);
}

#[tokio::test]
async fn persistence_failure_does_not_stop_delivery() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default())
        .with_audit(Arc::new(FileAuditStore::new(&blocker)));
    let n = notice(json!("sms"), json!([{"id": 1, "phone": "13800000001"}]));
    let report = dispatcher.dispatch(&n).await;

    assert!(report.persisted.is_none());
    assert_eq!(statuses(&report), vec![("sms", DeliveryStatus::Success)]);
}

#[tokio::test]
async fn callback_receives_raw_event_with_auth_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback"))
        .and(header("x-team", "ops"))
        // base64("u:p")
        .and(header("authorization", "Basic dTpw"))
        .and(body_partial_json(json!({"id": 4, "rule_name": "cpu too high"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = CallbackClient::new(&CallbackConfig {
        url: format!("{}/callback", server.uri()),
        basic_auth_user: Some("u".to_string()),
        basic_auth_pass: Some("p".to_string()),
        headers: vec!["X-Team".to_string(), "ops".to_string()],
        timeout_secs: 5,
    })
    .unwrap();
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default()).with_callback(client);
    let report = dispatcher.dispatch(&notice(json!(""), json!([]))).await;

    let callback = report.callback.expect("callback result");
    assert_eq!(callback.channel, "callback");
    assert_eq!(callback.status, DeliveryStatus::Success);
}

#[test]
fn odd_callback_headers_are_ignored() {
    let client = CallbackClient::new(&CallbackConfig {
        url: "http://127.0.0.1:9/cb".to_string(),
        basic_auth_user: None,
        basic_auth_pass: None,
        headers: vec!["X-Only-Name".to_string()],
        timeout_secs: 1,
    });
    assert!(client.is_ok());
}

// ---- robot transport ----

#[tokio::test]
async fn connection_error_does_not_expose_token() {
    let mut config = NotifyConfig::default();
    config.webhook_bases.insert(
        "dingtalk".to_string(),
        "http://127.0.0.1:1/robot/send?access_token=".to_string(),
    );
    let token = "SECRETTOKEN123456";
    let dispatcher = Dispatcher::from_config(&config);
    let n = notice(json!("dingtalk"), json!([{"id": 1, "contacts": {"dingtalk_robot_token": token}}]));
    let report = dispatcher.dispatch(&n).await;

    assert_eq!(report.results[0].status, DeliveryStatus::Failed);
    assert!(report.results[0].reason.is_some());
    let out = serde_json::to_string(&report).unwrap();
    assert!(!out.contains(token), "token in report: {out}");
}

#[tokio::test]
async fn server_error_is_retried_when_attempts_allow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.delivery.max_attempts = 2;
    let dispatcher = Dispatcher::from_config(&config);
    let n = notice(json!("dingtalk"), json!([{"id": 1, "contacts": {"dingtalk_robot_token": "T1"}}]));
    let report = dispatcher.dispatch(&n).await;

    assert_eq!(report.results[0].status, DeliveryStatus::Success);
    assert_eq!(report.results[0].retries, 1);
}

#[tokio::test]
async fn retries_stay_inside_channel_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.delivery.max_attempts = 5;
    // Backoff alone (100 + 200 + 400 + 800 ms) exceeds the limit.
    let dispatcher = Dispatcher::from_config(&config).with_timeout(Duration::from_millis(250));
    let n = notice(
        json!("dingtalk sms"),
        json!([{"id": 1, "phone": "13800000001", "contacts": {"dingtalk_robot_token": "T1"}}]),
    );

    let started = std::time::Instant::now();
    let report = dispatcher.dispatch(&n).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        statuses(&report),
        vec![("dingtalk", DeliveryStatus::TimedOut), ("sms", DeliveryStatus::Success)]
    );
}

#[tokio::test]
async fn dingtalk_secret_signs_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .and(query_param("access_token", "T1"))
        .and(|req: &wiremock::Request| {
            let params: std::collections::HashMap<String, String> =
                req.url.query_pairs().into_owned().collect();
            params.get("timestamp").is_some_and(|t| t.parse::<i64>().is_ok())
                && params.get("sign").is_some_and(|s| !s.is_empty())
        })
        .respond_with(ok_body())
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.robot.dingtalk_secret = Some("SEC0123456789".to_string());
    let dispatcher = Dispatcher::from_config(&config);
    let n = notice(json!("dingtalk"), json!([{"id": 1, "contacts": {"dingtalk_robot_token": "T1"}}]));
    let report = dispatcher.dispatch(&n).await;
    assert_eq!(report.results[0].status, DeliveryStatus::Success);
}
