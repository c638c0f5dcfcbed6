mod common;

use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use common::{entry, titles, FakeBackend};
use open_music_voice::audio::{
    queue::{QueueStore, RepeatMode},
    session::GuildSession,
};

fn session_with(queued: &[&str], repeat: RepeatMode) -> GuildSession<FakeBackend> {
    let mut session = GuildSession::new(100, true);
    for title in queued {
        session.queue.add(entry(title)).unwrap();
    }
    session.repeat = repeat;
    session
}

fn next_title(session: &mut GuildSession<FakeBackend>, finished: &str) -> Option<String> {
    session
        .select_next(Some(entry(finished)))
        .map(|e| e.title().to_string())
}

#[test]
fn test_repeat_off_drops_finished_entry() {
    let mut session = session_with(&["B", "C"], RepeatMode::Off);

    assert_eq!(next_title(&mut session, "A"), Some("B".to_string()));
    assert_eq!(titles(&session.queue.entries()), vec!["C"]);
}

#[test]
fn test_repeat_track_keeps_queue_untouched() {
    let mut session = session_with(&["B"], RepeatMode::Track);

    for _ in 0..3 {
        assert_eq!(next_title(&mut session, "A"), Some("A".to_string()));
    }
    assert_eq!(titles(&session.queue.entries()), vec!["B"]);

    // Sin entrada terminada (fallo) se avanza igual
    assert_eq!(
        session.select_next(None).map(|e| e.title().to_string()),
        Some("B".to_string())
    );
}

#[test]
fn test_repeat_queue_with_single_entry_alternates() {
    let mut session = session_with(&["B"], RepeatMode::Queue);

    assert_eq!(next_title(&mut session, "A"), Some("B".to_string()));
    assert_eq!(titles(&session.queue.entries()), vec!["A"]);

    assert_eq!(next_title(&mut session, "B"), Some("A".to_string()));
    assert_eq!(titles(&session.queue.entries()), vec!["B"]);
}

#[test]
fn test_repeat_queue_rotation_holds_with_shuffle() {
    for _ in 0..200 {
        let mut session = session_with(&["A"], RepeatMode::Queue);
        session.queue.set_shuffle(true);

        assert_eq!(next_title(&mut session, "N"), Some("A".to_string()));
        assert_eq!(titles(&session.queue.entries()), vec!["N"]);
    }
}

#[test]
fn test_repeat_queue_with_shuffle_plays_every_entry_before_repeating() {
    let mut session = session_with(&["B", "C", "D"], RepeatMode::Queue);
    session.queue.set_shuffle(true);

    let mut current = "A".to_string();
    let mut played = Vec::new();
    for _ in 0..3 {
        current = next_title(&mut session, &current).unwrap();
        played.push(current.clone());
    }

    // A acaba de volver al final: no puede sonar antes que B, C y D
    assert!(!played.contains(&"A".to_string()));
    played.sort();
    assert_eq!(played, vec!["B", "C", "D"]);
}

#[test]
fn test_repeat_queue_with_empty_queue_replays_finished() {
    let mut session = session_with(&[], RepeatMode::Queue);

    assert_eq!(next_title(&mut session, "A"), Some("A".to_string()));
    assert!(session.queue.is_empty());
}

#[test]
fn test_repeat_queue_ignores_capacity_for_requeue() {
    let mut session: GuildSession<FakeBackend> = GuildSession::new(1, true);
    session.queue.add(entry("B")).unwrap();
    session.repeat = RepeatMode::Queue;

    assert_eq!(next_title(&mut session, "A"), Some("B".to_string()));
    assert_eq!(session.queue.len(), 1);
}

#[test]
fn test_random_operations_keep_shuffle_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut queue = QueueStore::new(64);
    let mut model: Vec<String> = Vec::new();
    let mut next_id = 0;

    for _ in 0..2_000 {
        match rng.gen_range(0..6) {
            0 | 1 => {
                let title = format!("t{}", next_id);
                next_id += 1;
                if queue.add(entry(&title)).is_ok() {
                    model.push(title);
                }
            }
            2 if !queue.is_empty() => {
                let index = rng.gen_range(0..queue.len());
                let expected = queue.get(index).unwrap().title().to_string();
                let removed = queue.remove(index).unwrap();
                assert_eq!(removed.title(), expected);
                model.retain(|t| *t != expected);
            }
            3 => {
                if let Some(popped) = queue.pop_next() {
                    model.retain(|t| t != popped.title());
                }
            }
            4 => {
                queue.toggle_shuffle();
            }
            _ => {
                assert!(queue.remove(queue.len()).is_err());
            }
        }

        assert!(queue.is_consistent());
        assert_eq!(queue.len(), model.len());
        assert_eq!(queue.iter().count(), model.len());
    }

    let mut remaining = titles(&queue.entries());
    remaining.sort();
    model.sort();
    assert_eq!(remaining, model);
}
