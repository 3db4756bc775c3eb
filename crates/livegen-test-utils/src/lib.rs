//! Testing utilities for livegen workspace
//!
//! Shared fixtures, a scripted in-memory job server and session helpers.

#![allow(missing_docs)]

mod server;

pub use server::{ScriptedServer, ServerLog};

use livegen_runtime::{Compiler, ExternalProps, RenderSession, SandboxExecutor};
use livegen_source::Sanitizer;
use livegen_transport::ServerEvent;

/// Fenced, typed source with an import and a default export
pub const FENCED_APP: &str = "```tsx\nimport React from 'react';\nexport default function App(): JSX.Element {\n  return <div className=\"app\">Ready</div>;\n}\n```";

/// Counter with a click handler
pub const COUNTER_APP: &str = "function Counter() {\n  const [count, setCount] = useState(0);\n  return <button onClick={() => setCount(count + 1)}>{count}</button>;\n}";

/// Source that never parses
pub const BROKEN_APP: &str = "function App() {\n  return <div>{items.map(</div>;\n}";

/// Component that throws while rendering
pub const THROWING_APP: &str = "function App() { throw new Error('render exploded'); }";

/// List component with a checkpoint after each item
///
/// Each checkpoint closes the list, so every snapshot renders one more
/// `<li>` than the last.
#[must_use]
pub fn checkpointed_feed(items: usize) -> String {
    let mut src = String::from("function Feed() {\n  return (\n    <ul>\n");
    for i in 0..items {
        src.push_str(&format!(
            "      <li>entry {i}</li>/*@@checkpoint*/\n    </ul>\n  );\n}}/*@@end*/\n"
        ));
    }
    src.push_str("    </ul>\n  );\n}\n");
    src
}

/// Split `text` into pieces of at most `size` bytes, on char boundaries
#[must_use]
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > size && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Events of one streamed screen: a checkpoint per chunk, then the final unit
#[must_use]
pub fn streamed_screen(screen_id: &str, text: &str, chunk: usize) -> Vec<ServerEvent> {
    let mut events: Vec<ServerEvent> = chunked(text, chunk)
        .into_iter()
        .zip(1u64..)
        .map(|(text, seq)| ServerEvent::Checkpoint {
            screen_id: screen_id.to_string(),
            text,
            seq,
        })
        .collect();
    events.push(ServerEvent::UnitReady {
        screen_id: screen_id.to_string(),
        text: text.to_string(),
        extra: serde_json::Value::Null,
    });
    events
}

#[must_use]
pub fn complete() -> ServerEvent {
    ServerEvent::Complete {
        result: serde_json::json!({"ok": true}),
    }
}

/// Sanitize, compile and mount `raw` with default settings
///
/// # Panics
/// If the source does not sanitize or compile
#[must_use]
pub fn mount_source(screen_id: &str, raw: &str) -> RenderSession {
    let clean = Sanitizer::default().sanitize(raw).unwrap();
    let unit = Compiler::default().compile(&clean).unwrap();
    SandboxExecutor::default().mount(screen_id, unit, ExternalProps::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_char_boundaries() {
        let pieces = chunked("aé€b", 2);
        assert_eq!(pieces.concat(), "aé€b");
        assert!(pieces.iter().all(|p| p.len() <= 3));
    }

    #[test]
    fn streamed_screen_numbers_checkpoints() {
        let events = streamed_screen("s", "abcdef", 4);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], ServerEvent::Checkpoint { seq: 2, text, .. } if text == "ef"));
        assert!(matches!(&events[2], ServerEvent::UnitReady { .. }));
    }

    #[test]
    fn fixtures_mount() {
        assert!(!mount_source("a", FENCED_APP).is_fallback());
        assert!(!mount_source("b", COUNTER_APP).is_fallback());
        assert!(mount_source("c", THROWING_APP).is_fallback());
    }
}
