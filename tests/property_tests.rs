use parley::{Engine, HISTORY_DEPTH, History, Options};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["hello", "world", "how", "are", "you", "bot", "42"]).prop_map(str::to_string)
}

fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => word(),
        1 => Just("*".to_string()),
        1 => Just("#".to_string()),
        1 => Just("_".to_string()),
        1 => word().prop_map(|w| format!("[{w}]")),
        1 => (word(), word()).prop_map(|(a, b)| format!("({a}|{b})")),
    ]
}

/// A trigger pattern with at least one literal word and an optional weight.
fn pattern() -> impl Strategy<Value = String> {
    (word(), prop::collection::vec(token(), 0..4), any::<bool>(), prop::option::of(1u32..5)).prop_map(
        |(first, rest, lead, weight)| {
            let mut parts = rest;
            if lead {
                parts.insert(0, first);
            } else {
                parts.push(first);
            }
            let mut raw = parts.join(" ");
            if let Some(w) = weight {
                raw.push_str(&format!("{{weight={w}}}"));
            }
            raw
        },
    )
}

fn rules(patterns: &[String], catch_all: bool) -> String {
    let mut text = String::new();
    if catch_all {
        text.push_str("+ *\n- fallback\n");
    }
    for (i, p) in patterns.iter().enumerate() {
        text.push_str(&format!("+ {p}\n- reply {i}\n"));
    }
    text
}

fn seeded() -> Engine {
    Engine::with_options(Options { seed: Some(9), ..Options::default() }).unwrap()
}

proptest! {
    #[test]
    fn sorting_is_deterministic(patterns in prop::collection::vec(pattern(), 1..12), catch_all in any::<bool>()) {
        let text = rules(&patterns, catch_all);
        let a = seeded();
        let b = seeded();
        a.load_str("a", &text).unwrap();
        b.load_str("b", &text).unwrap();

        let first = a.sorted_triggers("random").unwrap();
        let second = b.sorted_triggers("random").unwrap();
        prop_assert_eq!(&first, &second);

        let unique: BTreeSet<&str> = patterns.iter().map(String::as_str).collect();
        prop_assert_eq!(first.len(), unique.len() + usize::from(catch_all));
    }

    #[test]
    fn weight_then_category_order(patterns in prop::collection::vec(pattern(), 1..12), catch_all in any::<bool>()) {
        let engine = seeded();
        engine.load_str("w", &rules(&patterns, catch_all)).unwrap();
        let sorted = engine.sorted_triggers("random").unwrap();

        for pair in sorted.windows(2) {
            prop_assert!(pair[0].weight >= pair[1].weight, "{} before {}", pair[0].pattern, pair[1].pattern);
            if pair[0].weight == pair[1].weight {
                prop_assert!(pair[0].category <= pair[1].category, "{} before {}", pair[0].pattern, pair[1].pattern);
            }
        }
    }

    #[test]
    fn replies_are_stable_for_the_same_seed(patterns in prop::collection::vec(pattern(), 1..8), inputs in prop::collection::vec(prop::collection::vec(word(), 1..5), 1..6)) {
        let text = rules(&patterns, true);
        let a = seeded();
        let b = seeded();
        a.load_str("a", &text).unwrap();
        b.load_str("b", &text).unwrap();

        for words in inputs {
            let message = words.join(" ");
            prop_assert_eq!(a.reply("u", &message), b.reply("u", &message));
            prop_assert_eq!(a.last_match("u"), b.last_match("u"));
        }
    }

    #[test]
    fn history_holds_the_newest_nine(pushes in prop::collection::vec("[a-z]{1,8}", 0..30)) {
        let mut history = History::new();
        for text in &pushes {
            history.push(text.as_str());
        }

        prop_assert_eq!(history.len(), HISTORY_DEPTH);
        prop_assert_eq!(history.get(0), None);
        prop_assert_eq!(history.get(HISTORY_DEPTH + 1), None);
        for (i, text) in pushes.iter().rev().take(HISTORY_DEPTH).enumerate() {
            prop_assert_eq!(history.get(i + 1), Some(text.as_str()));
        }
        for i in pushes.len()..HISTORY_DEPTH {
            prop_assert_eq!(history.get(i + 1), Some(parley::UNDEFINED));
        }
    }

    #[test]
    fn engine_history_is_bounded(messages in prop::collection::vec("[a-z]{1,6}", 1..25)) {
        let engine = seeded();
        engine.load_str("h", "+ *\n- <input1>/<input9>").unwrap();
        let mut last = String::new();
        for message in &messages {
            last = engine.reply("u", message);
        }

        let previous = messages.len().checked_sub(2).map(|i| messages[i].as_str()).unwrap_or(parley::UNDEFINED);
        let ninth = messages.len().checked_sub(10).map(|i| messages[i].as_str()).unwrap_or(parley::UNDEFINED);
        prop_assert_eq!(last, format!("{previous}/{ninth}"));
    }
}
