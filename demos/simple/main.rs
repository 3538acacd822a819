use std::fs::File;

use splitter::{Deadline, Event, MemoryEventRepository, MemoryFeatureRepository, ServiceConfig, User};

pub fn main() {
    env_logger::init();

    let features = MemoryFeatureRepository::from_reader(
        File::open("tests/data/features.json").expect("seed file should exist"),
    )
    .expect("seed file should be valid");
    let service = ServiceConfig::new(features, MemoryEventRepository::new())
        .to_service()
        .expect("cache sweeper thread should start");

    for feature in service.list_features(Deadline::NONE).unwrap_or_default() {
        let Some(feature_id) = feature.id else {
            continue;
        };

        for id in 1..=5 {
            let user = User::authenticated(id).expect("id is not zero");
            match service.get_assignment(feature_id, &user, Deadline::NONE) {
                Ok(Some(variant)) => {
                    println!("{}: user {} -> {}", feature.name, id, variant.name);
                    let event = Event::new(feature_id, user.id(), variant.name, "view")
                        .expect("event should be valid");
                    if let Err(err) = service.record_event(event, Deadline::NONE) {
                        eprintln!("failed to record event: {err}");
                    }
                }
                Ok(None) => println!("{}: not active", feature.name),
                Err(err) => eprintln!("{}: {err}", feature.name),
            }
        }
    }

    service.shutdown().expect("sweeper thread should not panic");
}
