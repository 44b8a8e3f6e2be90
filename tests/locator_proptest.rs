//! Property tests for locator resolution and relativization

use proptest::prelude::*;
use robundle_rs::Locator;

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_~ %-]{1,8}(\\.[a-z]{1,4})?"
}

fn relative_path() -> impl Strategy<Value = (Vec<String>, bool)> {
    (prop::collection::vec(segment(), 1..5), any::<bool>())
}

proptest! {
    #[test]
    fn relativize_then_resolve_is_identity((segments, is_dir) in relative_path()) {
        let base = Locator::parse("arcp://uuid,00000000-0000-4000-8000-000000000000/a/b/").unwrap();
        let mut path = segments.join("/");
        if is_dir {
            path.push('/');
        }
        let child = base.resolve(&Locator::from_path(&path));

        let relative = base.relativize(&child);
        prop_assert!(!relative.is_absolute());
        prop_assert_eq!(base.resolve(&relative), child);
    }

    #[test]
    fn outside_base_is_unchanged(segments in prop::collection::vec(segment(), 1..4)) {
        let base = Locator::parse("arcp://uuid,00000000-0000-4000-8000-000000000000/a/b/").unwrap();
        let other = Locator::parse("arcp://uuid,00000000-0000-4000-8000-000000000000/").unwrap()
            .resolve(&Locator::from_path(&format!("c/{}", segments.join("/"))));

        prop_assert_eq!(base.relativize(&other), other);
    }

    #[test]
    fn path_encoding_round_trips(path in "/([^/].{0,31})?") {
        let locator = Locator::from_path(&path);
        prop_assert_eq!(locator.decoded_path(), path);

        let reparsed = Locator::parse(&locator.to_string()).unwrap();
        prop_assert_eq!(reparsed, locator);
    }
}
