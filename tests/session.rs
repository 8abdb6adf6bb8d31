#![cfg(not(target_arch = "wasm32"))]

mod common;

use common::{at, harness, harness_with, has_class, root, Harness, Reply, LOCATION};
use core::time::Duration;
use mono_client::{
	platform::{DisabledScripts, ScriptError},
	Config, Dom, ScriptSink, Session, SessionEnd, SessionError, SessionState,
};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use tokio::{
	task::{spawn_local, LocalSet},
	time::sleep,
};

fn start(harness: &Harness) -> Session<mono_client::mem::MemDom> {
	Session::start(harness.host.clone(), harness.config.clone()).unwrap()
}

#[derive(Default)]
struct RecordingScripts(RefCell<Vec<String>>);
impl ScriptSink for RecordingScripts {
	fn eval(&self, code: &str) -> Result<(), ScriptError> {
		self.0.borrow_mut().push(code.to_owned());
		Ok(())
	}
}

#[tokio::test(start_paused = true)]
async fn update_then_expire() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><span>1</span></div>"#);
			harness
				.transport
				.reply_to_pull(Reply::json(json!({"kind": "update", "diffs": [["set_text", [0], "2"]]})))
				.reply_to_pull(Reply::json(json!({"kind": "expired"})));
			let session = start(&harness);
			let state = session.state_handle();

			assert_eq!(session.run().await.unwrap(), SessionEnd::Expired);
			assert_eq!(state.get(), SessionState::Expired);
			assert_eq!(harness.dom.text_content(&at(&harness.dom, &root(&harness.dom), &[0])), "2");
			assert!((harness.dom.opacity() - 0.3).abs() < f32::EPSILON);

			let pulls = harness.transport.pulls();
			assert_eq!(pulls.len(), 2);
			assert_eq!(pulls[0].url, LOCATION);
			assert_eq!(pulls[0].body, json!({"kind": "pull", "mono_id": "m"}));

			sleep(Duration::from_secs(60)).await;
			assert_eq!(harness.transport.requests().len(), 2);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn every_response_shape_is_applied_in_order() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><span>1</span></div>"#);
			harness
				.transport
				.reply_to_pull(Reply::json(json!([{"kind": "ignore"}, {"kind": "update", "diffs": [["set_text", [0], "2"]]}])))
				.reply_to_pull(Reply::json(json!({
					"kind": "events",
					"events": [{"kind": "update", "diffs": [["add_children", [], ["<b>3</b>"]]]}, {"kind": "expired"}],
				})));
			start(&harness).run().await.unwrap();
			assert_eq!(harness.dom.inner_html(&root(&harness.dom)), "<span>2</span><b>3</b>");
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_a_fixed_delay() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"></div>"#);
			harness
				.transport
				.reply_to_pull(Reply::Fail)
				.reply_to_pull(Reply::Status(503))
				.reply_to_pull(Reply::Fail)
				.reply_to_pull(Reply::json(json!({"kind": "ignore"})));
			let session = start(&harness);
			let state = session.state_handle();
			let _running = spawn_local(session.run());

			sleep(Duration::from_millis(500)).await;
			assert_eq!(state.get(), SessionState::Retrying);
			assert!((harness.dom.opacity() - 0.7).abs() < f32::EPSILON);

			sleep(Duration::from_secs(3)).await;
			assert_eq!(state.get(), SessionState::Polling);
			assert!((harness.dom.opacity() - 1.0).abs() < f32::EPSILON);

			let pulls = harness.transport.pulls();
			assert_eq!(pulls.len(), 5);
			for pair in pulls[..4].windows(2) {
				assert_eq!(pair[1].at - pair[0].at, Duration::from_secs(1));
			}
			assert_eq!(harness.transport.max_pulls_in_flight(), 1);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn pulls_never_time_out() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"></div>"#);
			harness.transport.reply_to_pull(Reply::Delayed(Duration::from_secs(600), json!({"kind": "expired"}).to_string()));
			assert_eq!(start(&harness).run().await.unwrap(), SessionEnd::Expired);
			assert_eq!(harness.transport.pulls().len(), 1);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_terminal() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"></div>"#);
			harness.transport.reply_to_pull(Reply::json(json!({"kind": "error", "message": "session lost"})));
			let session = start(&harness);
			let state = session.state_handle();

			let error = session.run().await.unwrap_err();
			assert!(matches!(&error, SessionError::Server(message) if message == "session lost"), "{}", error);
			assert_eq!(state.get(), SessionState::Errored);
			assert_eq!(harness.dom.alerts(), ["session lost"]);

			sleep(Duration::from_secs(60)).await;
			assert_eq!(harness.transport.requests().len(), 1);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn diff_failures_are_terminal() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"></div>"#);
			harness.transport.reply_to_pull(Reply::json(json!({"kind": "update", "diffs": [["set_text", [3], "x"]]})));
			let error = start(&harness).run().await.unwrap_err();
			assert!(matches!(error, SessionError::Diff(_)), "{}", error);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn unknown_diff_kinds_are_terminal() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><p>1</p></div>"#);
			harness.transport.reply_to_pull(Reply::json(json!({"kind": "update", "diffs": [["move_children", [0], 1]]})));
			let session = start(&harness);
			let state = session.state_handle();

			let error = session.run().await.unwrap_err();
			assert!(matches!(error, SessionError::Protocol(_)), "{}", error);
			assert_eq!(state.get(), SessionState::Errored);
			assert!((harness.dom.opacity() - 1.0).abs() < f32::EPSILON);

			sleep(Duration::from_secs(5)).await;
			assert_eq!(harness.transport.pulls().len(), 1);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn ending_a_session_clears_running_flashes() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><p flash>1</p></div>"#);
			harness
				.transport
				.reply_to_pull(Reply::json(json!({"kind": "update", "diffs": [["set_text", [0], "2"]]})))
				.reply_to_pull(Reply::json(json!({"kind": "expired"})));
			let p = at(&harness.dom, &root(&harness.dom), &[0]);

			start(&harness).run().await.unwrap();
			assert!(!has_class(&harness.dom, &p, "flash"));

			sleep(Duration::from_secs(5)).await;
			assert!(!has_class(&harness.dom, &p, "flash"));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn eval_runs_through_the_script_sink() {
	LocalSet::new()
		.run_until(async {
			let scripts = Rc::new(RecordingScripts::default());
			let harness = harness_with(r#"<div mono_id="m"></div>"#, Config::default(), scripts.clone());
			harness
				.transport
				.reply_to_pull(Reply::json(json!({"kind": "eval", "code": "console.log(1)"})))
				.reply_to_pull(Reply::json(json!({"kind": "expired"})));
			start(&harness).run().await.unwrap();
			assert_eq!(*scripts.0.borrow(), ["console.log(1)"]);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn eval_can_be_disabled() {
	LocalSet::new()
		.run_until(async {
			let scripts = Rc::new(RecordingScripts::default());
			let config = Config { allow_eval: false, ..Config::default() };
			let harness = harness_with(r#"<div mono_id="m"></div>"#, config, scripts.clone());
			harness.transport.reply_to_pull(Reply::json(json!({"kind": "eval", "code": "alert(1)"})));

			let error = start(&harness).run().await.unwrap_err();
			assert!(matches!(error, SessionError::Script(ScriptError::Disabled)), "{}", error);
			assert!(scripts.0.borrow().is_empty());
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn disabled_scripts_refuse_eval() {
	LocalSet::new()
		.run_until(async {
			let harness = harness_with(r#"<div mono_id="m"></div>"#, Config::default(), Rc::new(DisabledScripts));
			harness.transport.reply_to_pull(Reply::json(json!({"kind": "eval", "code": "1"})));
			let error = start(&harness).run().await.unwrap_err();
			assert!(matches!(error, SessionError::Script(ScriptError::Disabled)), "{}", error);
		})
		.await;
}

#[test]
fn exactly_one_named_root() {
	let start = |body: &str| {
		let harness = harness(body);
		Session::start(harness.host.clone(), harness.config.clone()).map(|session| session.mono_id().to_owned())
	};
	assert!(matches!(start("<div></div>"), Err(SessionError::NoRoot)));
	assert!(matches!(start(r#"<div mono_id="a"></div><div mono_id="b"></div>"#), Err(SessionError::MultipleRoots)));
	assert!(matches!(start(r#"<div mono_id=""></div>"#), Err(SessionError::EmptyId)));
	assert_eq!(start(r#"<main><div mono_id="a"></div></main>"#).unwrap(), "a");
}

#[test]
fn start_applies_the_initial_window_state() {
	let harness = harness(r#"<div mono_id="m" window_title="Inbox" window_location="http://app.test/inbox" window_icon="/favicon.png"></div>"#);
	let session = start(&harness);
	assert_eq!(session.state(), SessionState::Starting);
	assert_eq!(harness.dom.title(), "Inbox");
	assert_eq!(harness.dom.history(), [LOCATION, "http://app.test/inbox"]);
	assert_eq!(harness.dom.favicon().as_deref(), Some("/favicon.png"));
}

#[tokio::test(start_paused = true)]
async fn the_disabled_icon_marks_an_outage() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m" window_icon="/on.png" window_icon_disabled="/off.png"></div>"#);
			harness.transport.reply_to_pull(Reply::Fail).reply_to_pull(Reply::json(json!({"kind": "ignore"})));
			let _running = spawn_local(start(&harness).run());

			sleep(Duration::from_millis(500)).await;
			assert_eq!(harness.dom.favicon().as_deref(), Some("/off.png"));
			sleep(Duration::from_secs(1)).await;
			assert_eq!(harness.dom.favicon().as_deref(), Some("/on.png"));
		})
		.await;
}
