#![cfg(not(target_arch = "wasm32"))]

mod common;

use common::{at, harness, root, Harness, LOCATION};
use core::time::Duration;
use mono_client::{
	events::{EventCapture, EventKind, RawEvent},
	flash::SKIP_FLASH,
	protocol::Modifiers,
	Dom,
};
use serde_json::json;
use tokio::{task::LocalSet, time::sleep};

fn capture(harness: &Harness) -> EventCapture<mono_client::mem::MemDom> {
	EventCapture::new(harness.host.clone(), harness.config.clone())
}

#[tokio::test(start_paused = true)]
async fn click_reports_the_listening_element() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><p></p><p><button on_click><span>x</span></button></p></div>"#);
			let capture = capture(&harness);
			let span = at(&harness.dom, &root(&harness.dom), &[1, 0, 0]);

			let handled = capture.handle(RawEvent::click(span, Modifiers { ctrl: true, ..Modifiers::default() }));
			assert!(handled.prevent_default);

			sleep(Duration::from_millis(2)).await;
			let posts = harness.transport.event_posts();
			assert_eq!(posts.len(), 1);
			assert_eq!(posts[0].url, LOCATION);
			assert_eq!(
				posts[0].body,
				json!({
					"kind": "events",
					"mono_id": "m",
					"events": [{"kind": "click", "el": [1, 0], "click": {"special_keys": ["ctrl"]}}],
				})
			);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn unlistened_events_are_dropped() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><button>x</button></div><button on_click>outside</button>"#);
			let capture = capture(&harness);
			let body = harness.dom.body();

			let handled = capture.handle(RawEvent::click(at(&harness.dom, &root(&harness.dom), &[0]), Modifiers::default()));
			assert!(!handled.prevent_default);
			let handled = capture.handle(RawEvent::click(at(&harness.dom, &body, &[1]), Modifiers::default()));
			assert!(!handled.prevent_default);

			sleep(Duration::from_millis(600)).await;
			assert!(harness.transport.requests().is_empty());
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn events_within_the_debounce_window_share_a_request() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><button on_click on_dblclick>x</button><input on_change on_blur></div>"#);
			let capture = capture(&harness);
			let root = root(&harness.dom);
			let (button, input) = (at(&harness.dom, &root, &[0]), at(&harness.dom, &root, &[1]));

			let _ = capture.handle(RawEvent::click(button.clone(), Modifiers::default()));
			let _ = capture.handle(RawEvent::new(EventKind::DblClick, button));
			let _ = capture.handle(RawEvent::new(EventKind::Change, input.clone()));
			sleep(Duration::from_millis(2)).await;
			let _ = capture.handle(RawEvent::new(EventKind::Blur, input));
			sleep(Duration::from_millis(2)).await;

			let posts = harness.transport.event_posts();
			assert_eq!(posts.len(), 2);
			assert_eq!(
				posts[0].body["events"],
				json!([
					{"kind": "click", "el": [0], "click": {"special_keys": []}},
					{"kind": "dblclick", "el": [0], "dblclick": {"special_keys": []}},
					{"kind": "change", "el": [1], "change": {"stub": ""}},
				])
			);
			assert_eq!(posts[1].body["events"], json!([{"kind": "blur", "el": [1], "blur": {"stub": ""}}]));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn typing_is_coalesced_to_the_last_value() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><form><input></form></div>"#);
			let capture = capture(&harness);
			let input = at(&harness.dom, &root(&harness.dom), &[0, 0]);

			for value in ["a", "ab", "abc"] {
				let _ = capture.handle(RawEvent::input(input.clone(), value));
				sleep(Duration::from_millis(50)).await;
			}
			assert!(harness.transport.requests().is_empty());

			sleep(Duration::from_millis(500)).await;
			let posts = harness.transport.event_posts();
			assert_eq!(posts.len(), 1);
			assert_eq!(posts[0].body["events"], json!([{"kind": "input", "el": [0, 0], "input": {"value": "abc"}}]));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn pending_input_rides_along_with_the_next_event() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><input><button on_click>ok</button></div>"#);
			let capture = capture(&harness);
			let root = root(&harness.dom);

			let _ = capture.handle(RawEvent::input(at(&harness.dom, &root, &[0]), "hello"));
			let _ = capture.handle(RawEvent::click(at(&harness.dom, &root, &[1]), Modifiers::default()));
			sleep(Duration::from_secs(1)).await;

			let posts = harness.transport.event_posts();
			assert_eq!(posts.len(), 1);
			assert_eq!(
				posts[0].body["events"],
				json!([
					{"kind": "input", "el": [0], "input": {"value": "hello"}},
					{"kind": "click", "el": [1], "click": {"special_keys": []}},
				])
			);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn immediate_inputs_are_sent_one_by_one() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><input on_input="immediate"></div>"#);
			let capture = capture(&harness);
			let input = at(&harness.dom, &root(&harness.dom), &[0]);

			let _ = capture.handle(RawEvent::input(input.clone(), "a"));
			sleep(Duration::from_millis(2)).await;
			let _ = capture.handle(RawEvent::input(input, "ab"));
			sleep(Duration::from_millis(2)).await;

			let values: Vec<_> = harness.transport.event_posts().iter().map(|post| post.body["events"][0]["input"]["value"].clone()).collect();
			assert_eq!(values, [json!("a"), json!("ab")]);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn anchor_clicks_navigate_through_the_server() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><nav><a href="/b"><b>B</b></a></nav></div>"#);
			let capture = capture(&harness);
			let root = root(&harness.dom);
			let anchor = at(&harness.dom, &root, &[0, 0]);

			let handled = capture.handle(RawEvent::click(anchor, Modifiers::default()).with_href("http://app.test/b"));
			assert!(handled.prevent_default);
			assert_eq!(harness.dom.history(), [LOCATION, "http://app.test/b"]);
			assert!(harness.dom.has_attribute(&root, SKIP_FLASH));

			sleep(Duration::from_millis(2)).await;
			let posts = harness.transport.event_posts();
			assert_eq!(posts.len(), 1);
			assert_eq!(posts[0].url, "http://app.test/b");
			assert_eq!(posts[0].body["events"], json!([{"kind": "location", "el": [], "location": "http://app.test/b"}]));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn links_to_the_current_location_are_left_alone() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><a href="/" on_click>home</a></div>"#);
			let capture = capture(&harness);
			let anchor = at(&harness.dom, &root(&harness.dom), &[0]);

			let handled = capture.handle(RawEvent::click(anchor, Modifiers::default()).with_href(LOCATION));
			assert!(!handled.prevent_default);
			sleep(Duration::from_millis(10)).await;
			assert!(harness.transport.requests().is_empty());
			assert_eq!(harness.dom.history().len(), 1);
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn popstate_reports_the_new_location() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"></div>"#);
			let capture = capture(&harness);
			capture.popstate();
			assert!(harness.dom.has_attribute(&root(&harness.dom), SKIP_FLASH));

			sleep(Duration::from_millis(2)).await;
			let posts = harness.transport.event_posts();
			assert_eq!(posts[0].body["events"], json!([{"kind": "location", "el": [], "location": LOCATION}]));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn popstate_without_a_session_is_ignored() {
	LocalSet::new()
		.run_until(async {
			let harness = harness("<p>static</p>");
			capture(&harness).popstate();
			sleep(Duration::from_millis(10)).await;
			assert!(harness.transport.requests().is_empty());
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn lone_modifier_keys_are_not_reported() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><input on_keydown></div>"#);
			let capture = capture(&harness);
			let input = at(&harness.dom, &root(&harness.dom), &[0]);
			let meta = Modifiers { meta: true, ..Modifiers::default() };

			let _ = capture.handle(RawEvent::keydown(input.clone(), "Meta", meta));
			sleep(Duration::from_millis(10)).await;
			assert!(harness.transport.requests().is_empty());

			let _ = capture.handle(RawEvent::keydown(input, "s", meta));
			sleep(Duration::from_millis(2)).await;
			let posts = harness.transport.event_posts();
			assert_eq!(posts[0].body["events"], json!([{"kind": "keydown", "el": [0], "keydown": {"key": "s", "special_keys": ["meta"]}}]));
		})
		.await;
}

#[tokio::test(start_paused = true)]
async fn failed_sends_are_not_retried() {
	LocalSet::new()
		.run_until(async {
			let harness = harness(r#"<div mono_id="m"><button on_click>x</button></div>"#);
			harness.transport.reply_to_events(common::Reply::Status(500));
			let capture = capture(&harness);

			let _ = capture.handle(RawEvent::click(at(&harness.dom, &root(&harness.dom), &[0]), Modifiers::default()));
			sleep(Duration::from_secs(10)).await;
			assert_eq!(harness.transport.event_posts().len(), 1);
		})
		.await;
}
