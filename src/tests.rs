//! Conversation fixtures.
//!
//! Each test loads a small rule set and plays a conversation against it,
//! checking every reply in order.

use crate::{Diagnostic, Engine, MacroCall, MacroError, MacroHandler, Options};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

fn bot(text: &str) -> Engine {
    let engine = Engine::with_options(Options { seed: Some(2024), ..Options::default() }).unwrap();
    engine.load_str("fixture", text).unwrap();
    engine
}

#[track_caller]
fn chat(engine: &Engine, turns: &[(&str, &str)]) {
    for (message, expected) in turns {
        assert_eq!(engine.reply("local-user", message), *expected, "reply to {message:?}");
    }
}

#[test]
fn previous() {
    let engine = bot(&crate::rive![
        "! sub who's = who is",
        "",
        "+ knock knock",
        "- Who's there?",
        "",
        "+ *",
        "% who is there",
        "- <sentence> who?",
        "",
        "+ *",
        "% * who",
        "- Haha! <sentence>!",
        "",
        "+ *",
        "- I don't know.",
    ]);
    chat(
        &engine,
        &[
            ("Knock knock", "Who's there?"),
            ("Canoe", "Canoe who?"),
            ("Canoe help me with my homework?", "Haha! Canoe help me with my homework!"),
            ("hello", "I don't know."),
        ],
    );
}

#[test]
fn random() {
    let engine = bot(&crate::rive![
        "+ test random response",
        "- One.",
        "- Two.",
        "",
        "+ test random tag",
        "- This sentence has a random {random}word|bit{/random}.",
    ]);

    let mut responses = BTreeSet::new();
    let mut tags = BTreeSet::new();
    for _ in 0..64 {
        responses.insert(engine.reply("u", "test random response"));
        tags.insert(engine.reply("u", "test random tag"));
    }
    assert_eq!(responses, BTreeSet::from(["One.".to_string(), "Two.".to_string()]));
    assert_eq!(
        tags,
        BTreeSet::from([
            "This sentence has a random bit.".to_string(),
            "This sentence has a random word.".to_string(),
        ])
    );
}

#[test]
fn seeded_engines_agree() {
    let rules = "+ pick\n- a\n- b\n- c\n- d";
    let first = bot(rules);
    let second = bot(rules);
    for _ in 0..20 {
        assert_eq!(first.reply("u", "pick"), second.reply("u", "pick"));
    }
}

#[test]
fn continuations() {
    let engine = bot(&crate::rive![
        "+ tell me a poem",
        "- There once was a man named Tim,\\s",
        "^ who never quite learned how to swim.\\s",
        "^ He fell off a dock, and sank like a rock,\\s",
        "^ and that was the end of him.",
    ]);
    chat(
        &engine,
        &[(
            "Tell me a poem.",
            "There once was a man named Tim, who never quite learned how to swim. \
             He fell off a dock, and sank like a rock, and that was the end of him.",
        )],
    );
}

#[test]
fn redirects() {
    let engine = bot(&crate::rive![
        "+ hello",
        "- Hi there!",
        "",
        "+ hey",
        "@ hello",
        "",
        "+ hi there",
        "- {@hello}",
        "",
        "+ greet *",
        "- <@>",
    ]);
    chat(&engine, &[("hello", "Hi there!"), ("hey", "Hi there!"), ("hi there", "Hi there!"), ("greet hello", "Hi there!")]);
}

#[test]
fn conditionals() {
    let engine = bot(&crate::rive![
        "+ i am # years old",
        "- <set age=<star>>OK.",
        "",
        "+ what can i do",
        "* <get age> == undefined => I don't know.",
        "* <get age> >  25 => Anything you want.",
        "* <get age> == 25 => Rent a car for cheap.",
        "* <get age> >= 21 => Drink.",
        "* <get age> >= 18 => Vote.",
        "* <get age> <  18 => Not much of anything.",
        "",
        "+ am i your master",
        "* <get master> == true => Yes.",
        "- No.",
    ]);

    let question = "What can I do?";
    chat(&engine, &[(question, "I don't know.")]);

    let ages = [
        ("16", "Not much of anything."),
        ("18", "Vote."),
        ("20", "Vote."),
        ("22", "Drink."),
        ("24", "Drink."),
        ("25", "Rent a car for cheap."),
        ("27", "Anything you want."),
    ];
    for (age, answer) in ages {
        let statement = format!("I am {age} years old.");
        chat(&engine, &[(statement.as_str(), "OK."), (question, answer)]);
    }

    chat(&engine, &[("Am I your master?", "No.")]);
    engine.set_uservar("local-user", "master", "true");
    chat(&engine, &[("Am I your master?", "Yes.")]);
}

#[test]
fn set_uservars() {
    let engine = bot(&crate::rive![
        "+ what is my name",
        "- Your name is <get name>.",
        "",
        "+ how old am i",
        "- You are <get age>.",
    ]);
    engine.set_uservars("local-user", [("name", "Aiden"), ("age", "5")]);
    chat(&engine, &[("What is my name?", "Your name is Aiden."), ("how old am I?", "You are 5.")]);
}

#[test]
fn question_mark() {
    let engine = bot(&crate::rive![
        "+ google *",
        "- <a href=\"https://www.google.com/search?q=<star>\">Results are here</a>",
    ]);
    chat(&engine, &[("google java", "<a href=\"https://www.google.com/search?q=java\">Results are here</a>")]);
}

#[test]
fn literal_trigger_beats_catch_all() {
    let engine = bot(&crate::rive![
        "+ *",
        "- Fallback.",
        "",
        "+ hello",
        "- Exact.",
        "",
        "+ hello *",
        "- Hello <star>.",
        "",
        "+ [please] help",
        "- Helping.",
    ]);
    chat(
        &engine,
        &[
            ("hello", "Exact."),
            ("hello world", "Hello world."),
            ("please help", "Helping."),
            ("help", "Helping."),
            ("something else", "Fallback."),
            ("", "Fallback."),
        ],
    );
}

#[test]
fn undefined_values_render_as_undefined() {
    let engine = bot(&crate::rive![
        "! var name = Parley",
        "",
        "+ who are you",
        "- I am <bot name>, you are <get name>, my age is <bot age>.",
    ]);
    chat(&engine, &[("who are you", "I am Parley, you are undefined, my age is undefined.")]);
}

#[test]
fn deep_recursion_is_reported() {
    let engine = bot(&crate::rive![
        "+ ping",
        "@ pong",
        "",
        "+ pong",
        "@ ping",
    ]);
    let out = engine.reply_verbose("u", "ping");
    assert_eq!(out.reply, "ERR: Deep Recursion Detected");
    assert!(out.details.aborted);
    assert!(out.details.diagnostics.contains(&Diagnostic::RedirectDepthExceeded { depth: 50 }));
    assert_eq!(engine.last_match("u").as_deref(), Some("ping"));
}

#[test]
fn no_match_and_no_reply() {
    let engine = bot("+ silent\n* <get mood> == happy => Yay.\n+ hello\n- Hi.");
    chat(&engine, &[("goodbye", "ERR: No Reply Matched"), ("silent", "ERR: No Reply Found")]);

    let custom = Engine::with_options(Options {
        no_match_reply: "Sorry?".into(),
        ..Options::default()
    })
    .unwrap();
    custom.load_str("fixture", "+ hello\n- Hi.").unwrap();
    assert_eq!(custom.reply("u", "what"), "Sorry?");
}

#[test]
fn topics_switch_and_inherit() {
    let engine = bot(&crate::rive![
        "+ let's play a game",
        "- {topic=game}OK. Say quit to stop.",
        "",
        "+ *",
        "- Let's keep chatting.",
        "",
        "> topic game",
        "+ quit",
        "- {topic=random}Bye then.",
        "+ *",
        "- Your move.",
        "< topic",
        "",
        "> topic lobby inherits random",
        "+ look",
        "- A plain room.",
        "< topic",
    ]);
    chat(
        &engine,
        &[
            ("Let's play a game!", "OK. Say quit to stop."),
            ("let's play a game", "Your move."),
            ("quit", "Bye then."),
            ("hi", "Let's keep chatting."),
        ],
    );

    engine.set_uservar("local-user", "topic", "lobby");
    chat(&engine, &[("look", "A plain room."), ("let's play a game", "OK. Say quit to stop.")]);
    assert_eq!(engine.uservar("local-user", "topic"), "game");
}

#[test]
fn included_triggers_rank_with_local_ones() {
    let engine = bot(&crate::rive![
        "> topic a includes b",
        "+ *",
        "- A catch-all.",
        "< topic",
        "",
        "> topic b",
        "+ hello",
        "- B hello.",
        "< topic",
    ]);

    let sorted = engine.sorted_triggers("a").unwrap();
    let patterns: Vec<&str> = sorted.iter().map(|t| t.pattern.as_str()).collect();
    assert_eq!(patterns, vec!["hello", "*"]);
    assert_eq!(sorted[0].topic, "b");

    engine.set_uservar("local-user", "topic", "a");
    chat(&engine, &[("hello", "B hello."), ("other", "A catch-all.")]);
    assert_eq!(engine.last_match("local-user").as_deref(), Some("*"));
}

#[test]
fn begin_blocks_are_skipped() {
    let engine = bot(&crate::rive![
        "> begin",
        "+ request",
        "- {ok}",
        "< begin",
        "",
        "+ hello",
        "- Hi.",
    ]);
    chat(&engine, &[("hello", "Hi."), ("request", "ERR: No Reply Matched")]);
}

#[derive(Default)]
struct EchoHandler {
    objects: Mutex<HashMap<String, String>>,
}

impl MacroHandler for EchoHandler {
    fn load(&self, name: &str, code: &str) -> Result<(), MacroError> {
        self.objects.lock().unwrap().insert(name.to_string(), code.trim().to_string());
        Ok(())
    }

    fn call(&self, call: &mut MacroCall<'_>) -> Result<String, MacroError> {
        let objects = self.objects.lock().unwrap();
        let code = objects.get(call.name).ok_or_else(|| MacroError::Failed(format!("{} not loaded", call.name)))?;
        call.user.set("greeted", "yes");
        Ok(format!("{code}, {}", call.args.join(" ")))
    }
}

#[test]
fn object_macros_run_through_handlers() {
    let engine = Engine::new();
    engine.set_handler("echo", EchoHandler::default());
    engine
        .load_str(
            "fixture",
            &crate::rive![
                "> object greet echo",
                "Greetings from an object",
                "< object",
                "",
                "> object unused lisp",
                "(never loaded)",
                "< object",
                "",
                "+ greet *",
                "- <call>greet <formal></call>!",
                "",
                "+ lisp",
                "- [<call>unused</call>]",
            ],
        )
        .unwrap();

    assert_eq!(engine.reply("u", "greet ada lovelace"), "Greetings from an object, Ada Lovelace!");
    assert_eq!(engine.uservar("u", "greeted"), "yes");

    let out = engine.reply_verbose("u", "lisp");
    assert_eq!(out.reply, "[]");
    assert_eq!(out.details.diagnostics, vec![Diagnostic::UndefinedMacro("unused".into())]);
}
