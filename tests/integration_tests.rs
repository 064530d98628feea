use heartecho::config::{AuthConfig, ContentConfig};
use heartecho::error::user_message;
use heartecho::models::{SaveMode, Signup, StoryInput, StoryStatus, StoryType, UpdateProfile};
use heartecho::services::{auth, comments, engagement, profiles, series, stories};
use heartecho::{Database, ServiceError};

fn create_test_db() -> Database {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let id: u32 = rng.gen();
    let name = format!("test_db_{}", id);

    let db = Database::open_memory(&name).expect("Failed to create test database");
    db.migrate().expect("Failed to run migrations");
    db
}

const TEST_PASSWORD: &str = "secret123";

fn signup_form(username: &str) -> Signup {
    Signup {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        display_name: String::new(),
        password: TEST_PASSWORD.to_string(),
        password_confirm: TEST_PASSWORD.to_string(),
    }
}

fn create_user(db: &Database, username: &str) -> i64 {
    auth::signup(db, &AuthConfig::default(), &signup_form(username)).expect("Failed to sign up")
}

fn story_input(title: &str, story_type: StoryType) -> StoryInput {
    StoryInput {
        title: title.to_string(),
        content: format!("The words of {}.", title),
        story_type,
        ..Default::default()
    }
}

fn chapter_input(title: &str, series_id: i64) -> StoryInput {
    StoryInput {
        series_id: Some(series_id),
        ..story_input(title, StoryType::OneTime)
    }
}

fn publish(db: &Database, author: i64, input: StoryInput) -> heartecho::models::Story {
    stories::create_story(db, &ContentConfig::default(), author, input, SaveMode::Publish)
        .expect("Failed to publish story")
}

fn is_invalid(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::Invalid(_)))
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::NotFound(_)))
}

mod auth_integration_tests {
    use super::*;

    #[test]
    fn test_signup_and_authenticate_by_username_or_email() {
        let db = create_test_db();
        let id = create_user(&db, "Maya");
        assert!(id > 0);

        let by_name = auth::authenticate(&db, "maya", TEST_PASSWORD)
            .unwrap()
            .expect("login by username");
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.username, "maya");

        let by_email = auth::authenticate(&db, "MAYA@example.com", TEST_PASSWORD)
            .unwrap()
            .expect("login by email");
        assert_eq!(by_email.id, id);

        assert!(auth::authenticate(&db, "maya", "wrong-password").unwrap().is_none());
        assert!(auth::authenticate(&db, "nobody", TEST_PASSWORD).unwrap().is_none());
    }

    #[test]
    fn test_signup_validation_order() {
        let db = create_test_db();
        let rules = AuthConfig::default();

        let mut form = signup_form("x");
        form.password_confirm = "different".into();
        let err = auth::signup(&db, &rules, &form).unwrap_err();
        assert_eq!(user_message(&err).as_deref(), Some("Passwords do not match"));

        let mut form = signup_form("x");
        form.password = "123".into();
        form.password_confirm = "123".into();
        let err = auth::signup(&db, &rules, &form).unwrap_err();
        assert_eq!(
            user_message(&err).as_deref(),
            Some("Password must be at least 6 characters")
        );

        let err = auth::signup(&db, &rules, &signup_form("x")).unwrap_err();
        assert_eq!(
            user_message(&err).as_deref(),
            Some("Username must be at least 3 characters")
        );
    }

    #[test]
    fn test_signup_rejects_duplicates() {
        let db = create_test_db();
        create_user(&db, "maya");

        let err = auth::signup(&db, &AuthConfig::default(), &signup_form("maya")).unwrap_err();
        assert_eq!(user_message(&err).as_deref(), Some("Username is already taken"));

        let mut form = signup_form("other");
        form.email = "maya@example.com".into();
        let err = auth::signup(&db, &AuthConfig::default(), &form).unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_session_lifecycle() {
        let db = create_test_db();
        let id = create_user(&db, "maya");

        let token = auth::create_session(&db, id, 7).unwrap();
        let user = auth::validate_session(&db, &token).unwrap().expect("valid session");
        assert_eq!(user.id, id);

        auth::delete_session(&db, &token).unwrap();
        assert!(auth::validate_session(&db, &token).unwrap().is_none());
    }

    #[test]
    fn test_expired_sessions_are_rejected_and_cleaned_up() {
        let db = create_test_db();
        let id = create_user(&db, "maya");
        {
            let conn = db.get().unwrap();
            conn.execute(
                "INSERT INTO sessions (user_id, token, expires_at) VALUES (?, 'old', '2000-01-01T00:00:00Z')",
                [id],
            )
            .unwrap();
        }
        let fresh = auth::create_session(&db, id, 1).unwrap();

        assert!(auth::validate_session(&db, "old").unwrap().is_none());
        assert_eq!(auth::cleanup_expired_sessions(&db).unwrap(), 1);
        assert!(auth::validate_session(&db, &fresh).unwrap().is_some());
    }

    #[test]
    fn test_update_password() {
        let db = create_test_db();
        create_user(&db, "maya");
        auth::update_password(&db, &AuthConfig::default(), "maya", "newsecret").unwrap();

        assert!(auth::authenticate(&db, "maya", TEST_PASSWORD).unwrap().is_none());
        assert!(auth::authenticate(&db, "maya", "newsecret").unwrap().is_some());

        let err = auth::update_password(&db, &AuthConfig::default(), "ghost", "newsecret").unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_delete_user_removes_their_stories() {
        let db = create_test_db();
        let id = create_user(&db, "maya");
        let story = publish(&db, id, story_input("Gone", StoryType::OneTime));

        assert!(auth::delete_user(&db, "maya").unwrap());
        assert!(stories::get_story(&db, story.id).unwrap().is_none());
        assert!(!auth::delete_user(&db, "maya").unwrap());
    }
}

mod story_integration_tests {
    use super::*;

    #[test]
    fn test_publish_standalone_story() {
        let db = create_test_db();
        let author = create_user(&db, "maya");

        let mut input = story_input("Rain", StoryType::OneTime);
        input.tags = vec!["grief".into(), " #Grief ".into(), "letters".into()];
        input.genre = Some("  Drama ".into());
        let story = publish(&db, author, input);

        assert_eq!(story.status, StoryStatus::Published);
        assert_eq!(story.chapter_number, 1);
        assert_eq!(story.series_id, None);
        assert!(story.published_at.is_some());
        assert_eq!(story.tags, vec!["grief", "letters"]);
        assert_eq!(story.genre.as_deref(), Some("Drama"));
        assert_eq!(story.excerpt.as_deref(), Some("The words of Rain."));

        let profile = profiles::get_profile(&db, author).unwrap().unwrap();
        assert_eq!(profile.stories_count, 1);
    }

    #[test]
    fn test_draft_defaults_and_visibility() {
        let db = create_test_db();
        let author = create_user(&db, "maya");

        let draft = stories::create_story(
            &db,
            &ContentConfig::default(),
            author,
            StoryInput::default(),
            SaveMode::Draft,
        )
        .unwrap();
        assert_eq!(draft.title, "Untitled Draft");
        assert_eq!(draft.status, StoryStatus::Draft);
        assert!(draft.published_at.is_none());

        assert!(stories::list_published(&db, 10, 0).unwrap().is_empty());
        assert_eq!(stories::count_published(&db).unwrap(), 0);
        assert_eq!(stories::list_author_stories(&db, author).unwrap().len(), 1);
        assert_eq!(profiles::get_profile(&db, author).unwrap().unwrap().stories_count, 0);
    }

    #[test]
    fn test_publish_requires_title() {
        let db = create_test_db();
        let author = create_user(&db, "maya");

        let err = stories::create_story(
            &db,
            &ContentConfig::default(),
            author,
            story_input("   ", StoryType::OneTime),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_tag_limit_enforced() {
        let db = create_test_db();
        let author = create_user(&db, "maya");
        let mut input = story_input("Tagged", StoryType::OneTime);
        input.tags = (0..6).map(|i| format!("tag{}", i)).collect();

        let err = stories::create_story(&db, &ContentConfig::default(), author, input, SaveMode::Publish)
            .unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_chapters_are_numbered_after_the_root() {
        let db = create_test_db();
        let author = create_user(&db, "maya");
        let root = publish(&db, author, story_input("Letters", StoryType::Novel));

        assert_eq!(stories::next_chapter_number(&db, root.id).unwrap(), 2);
        let second = publish(&db, author, chapter_input("Second letter", root.id));
        let third = publish(&db, author, chapter_input("Third letter", root.id));

        assert_eq!(second.chapter_number, 2);
        assert_eq!(third.chapter_number, 3);
        assert_eq!(second.series_id, Some(root.id));
        assert_eq!(second.story_type, StoryType::Novel);

        let chapters = stories::series_chapters(&db, root.id).unwrap();
        let ids: Vec<i64> = chapters.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![root.id, second.id, third.id]);

        let parents = stories::list_parent_series(&db, author).unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, root.id);
    }

    #[test]
    fn test_chapter_requires_owned_series_root() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let sam = create_user(&db, "sam");

        let standalone = publish(&db, maya, story_input("Alone", StoryType::OneTime));
        let err = stories::create_story(
            &db,
            &ContentConfig::default(),
            maya,
            chapter_input("Nope", standalone.id),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_invalid(&err));

        let series_root = publish(&db, maya, story_input("Ours", StoryType::Series));
        let err = stories::create_story(
            &db,
            &ContentConfig::default(),
            sam,
            chapter_input("Hijack", series_root.id),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_not_found(&err));

        let chapter = publish(&db, maya, chapter_input("Two", series_root.id));
        let err = stories::create_story(
            &db,
            &ContentConfig::default(),
            maya,
            chapter_input("Nested", chapter.id),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_update_story_rules() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let sam = create_user(&db, "sam");
        let rules = ContentConfig::default();

        let root = publish(&db, maya, story_input("Series", StoryType::Series));
        let two = publish(&db, maya, chapter_input("Two", root.id));
        let three = publish(&db, maya, chapter_input("Three", root.id));

        // renumbering onto an existing chapter, including the root, is rejected
        let mut input = chapter_input("Three", root.id);
        input.chapter_number = Some(2);
        let err = stories::update_story(&db, &rules, maya, three.id, input, SaveMode::Publish).unwrap_err();
        assert!(is_invalid(&err));

        let mut input = chapter_input("Three", root.id);
        input.chapter_number = Some(1);
        let err = stories::update_story(&db, &rules, maya, three.id, input, SaveMode::Publish).unwrap_err();
        assert!(is_invalid(&err));

        let mut input = chapter_input("Three, revised", root.id);
        input.chapter_number = Some(5);
        let updated = stories::update_story(&db, &rules, maya, three.id, input, SaveMode::Publish).unwrap();
        assert_eq!(updated.chapter_number, 5);
        assert_eq!(updated.title, "Three, revised");
        assert_eq!(updated.published_at, three.published_at);

        let err = stories::update_story(&db, &rules, maya, two.id, chapter_input("Two", two.id), SaveMode::Publish)
            .unwrap_err();
        assert!(is_invalid(&err));

        let err = stories::update_story(
            &db,
            &rules,
            sam,
            two.id,
            chapter_input("Two", root.id),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_not_found(&err));

        let err = stories::update_story(
            &db,
            &rules,
            maya,
            root.id,
            story_input("Series", StoryType::OneTime),
            SaveMode::Publish,
        )
        .unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_unpublishing_to_draft() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let story = publish(&db, maya, story_input("Second thoughts", StoryType::OneTime));

        let draft = stories::update_story(
            &db,
            &ContentConfig::default(),
            maya,
            story.id,
            story_input("Second thoughts", StoryType::OneTime),
            SaveMode::Draft,
        )
        .unwrap();
        assert_eq!(draft.status, StoryStatus::Draft);
        assert!(draft.published_at.is_none());
        assert_eq!(profiles::get_profile(&db, maya).unwrap().unwrap().stories_count, 0);
    }

    #[test]
    fn test_set_status() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let series_root = publish(&db, maya, story_input("Long road", StoryType::Series));
        let standalone = publish(&db, maya, story_input("Short walk", StoryType::OneTime));

        let done = stories::set_status(&db, maya, series_root.id, StoryStatus::Completed).unwrap();
        assert_eq!(done.status, StoryStatus::Completed);
        assert_eq!(stories::count_published(&db).unwrap(), 2);

        let err = stories::set_status(&db, maya, standalone.id, StoryStatus::OnHold).unwrap_err();
        assert!(is_invalid(&err));
        let err = stories::set_status(&db, maya, series_root.id, StoryStatus::Draft).unwrap_err();
        assert!(is_invalid(&err));

        // editing a completed work keeps its status
        let edited = stories::update_story(
            &db,
            &ContentConfig::default(),
            maya,
            series_root.id,
            story_input("Long road", StoryType::Series),
            SaveMode::Publish,
        )
        .unwrap();
        assert_eq!(edited.status, StoryStatus::Completed);
    }

    #[test]
    fn test_deleting_root_deletes_chapters() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let root = publish(&db, maya, story_input("Trilogy", StoryType::Series));
        let two = publish(&db, maya, chapter_input("Two", root.id));
        publish(&db, maya, chapter_input("Three", root.id));
        engagement::toggle_like(&db, reader, two.id).unwrap();
        comments::post_comment(&db, reader, two.id, None, "Loved it").unwrap();

        let err = stories::delete_story(&db, reader, root.id).unwrap_err();
        assert!(is_not_found(&err));

        assert_eq!(stories::delete_story(&db, maya, root.id).unwrap(), 3);
        assert!(stories::list_author_stories(&db, maya).unwrap().is_empty());
        assert_eq!(profiles::get_profile(&db, maya).unwrap().unwrap().stories_count, 0);

        let conn = db.get().unwrap();
        let likes: i64 = conn.query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0)).unwrap();
        let comment_rows: i64 = conn.query_row("SELECT COUNT(*) FROM comments", [], |r| r.get(0)).unwrap();
        assert_eq!(likes, 0);
        assert_eq!(comment_rows, 0);
    }

    #[test]
    fn test_deleting_chapter_keeps_root() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let root = publish(&db, maya, story_input("Pair", StoryType::Series));
        let two = publish(&db, maya, chapter_input("Two", root.id));

        assert_eq!(stories::delete_story(&db, maya, two.id).unwrap(), 1);
        assert!(stories::get_story(&db, root.id).unwrap().is_some());
    }

    #[test]
    fn test_listings_show_top_level_works_only() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let root = publish(&db, maya, story_input("Series", StoryType::Series));
        publish(&db, maya, chapter_input("Two", root.id));
        publish(&db, maya, story_input("Standalone", StoryType::OneTime));

        let listed = stories::list_published(&db, 10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.story.is_top_level()));
        assert!(listed.iter().all(|s| s.author.as_ref().map(|a| a.id) == Some(maya)));
        assert_eq!(stories::count_published(&db).unwrap(), 2);
    }

    #[test]
    fn test_featured_stories() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let story = publish(&db, maya, story_input("Star", StoryType::OneTime));

        assert!(stories::list_featured(&db, 3).unwrap().is_empty());
        stories::set_featured(&db, story.id, true).unwrap();
        let featured = stories::list_featured(&db, 3).unwrap();
        assert_eq!(featured.len(), 1);
        assert!(featured[0].story.is_featured);

        assert!(is_not_found(&stories::set_featured(&db, 9999, true).unwrap_err()));
    }

    #[test]
    fn test_related_stories_by_author_or_tag() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let sam = create_user(&db, "sam");
        let lee = create_user(&db, "lee");

        let mut input = story_input("Origin", StoryType::OneTime);
        input.tags = vec!["grief".into()];
        let origin = publish(&db, maya, input);

        let same_author = publish(&db, maya, story_input("Also maya", StoryType::OneTime));
        let mut input = story_input("Shared tag", StoryType::OneTime);
        input.tags = vec!["grief".into(), "rain".into()];
        let shared_tag = publish(&db, sam, input);
        publish(&db, lee, story_input("Unrelated", StoryType::OneTime));

        let related = stories::related_stories(&db, &origin, 4).unwrap();
        let mut ids: Vec<i64> = related.iter().map(|s| s.story.id).collect();
        ids.sort();
        assert_eq!(ids, vec![same_author.id, shared_tag.id]);
    }

    #[test]
    fn test_record_view() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let story = publish(&db, maya, story_input("Seen", StoryType::OneTime));
        stories::record_view(&db, story.id).unwrap();
        stories::record_view(&db, story.id).unwrap();
        assert_eq!(stories::get_story(&db, story.id).unwrap().unwrap().views_count, 2);
    }
}

mod series_integration_tests {
    use super::*;

    #[test]
    fn test_materialize_author_works_from_database() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");

        let novel = publish(&db, maya, story_input("Novel", StoryType::Novel));
        let ch2 = publish(&db, maya, chapter_input("Chapter two", novel.id));
        let ch3 = publish(&db, maya, chapter_input("Chapter three", novel.id));
        let standalone = publish(&db, maya, story_input("Standalone", StoryType::OneTime));

        let records = stories::list_visible_by_author(&db, maya).unwrap();
        assert_eq!(records.len(), 4);

        let works = series::materialize(records);
        assert_eq!(works.len(), 2);

        let novel_work = works.iter().find(|w| w.story.id == novel.id).unwrap();
        let chapter_ids: Vec<i64> = novel_work.chapters.iter().map(|c| c.id).collect();
        assert_eq!(chapter_ids, vec![ch2.id, ch3.id]);

        let standalone_work = works.iter().find(|w| w.story.id == standalone.id).unwrap();
        assert!(standalone_work.chapters.is_empty());
    }

    #[test]
    fn test_chapter_navigation_over_database_chapters() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let root = publish(&db, maya, story_input("Root", StoryType::Series));
        let two = publish(&db, maya, chapter_input("Two", root.id));
        let three = publish(&db, maya, chapter_input("Three", root.id));

        let chapters = stories::series_chapters(&db, root.id).unwrap();
        let nav = series::chapter_navigation(&two, &chapters).unwrap();
        assert_eq!(nav.total_chapters, 3);
        assert_eq!(nav.prev.map(|p| p.id), Some(root.id));
        assert_eq!(nav.next.map(|n| n.id), Some(three.id));
    }

    #[test]
    fn test_draft_chapters_hidden_from_readers() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let root = publish(&db, maya, story_input("Root", StoryType::Series));
        stories::create_story(
            &db,
            &ContentConfig::default(),
            maya,
            chapter_input("Unfinished", root.id),
            SaveMode::Draft,
        )
        .unwrap();

        assert_eq!(stories::series_chapters(&db, root.id).unwrap().len(), 1);
        let works = series::materialize(stories::list_visible_by_author(&db, maya).unwrap());
        assert!(works[0].chapters.is_empty());

        let all = series::materialize(stories::list_author_stories(&db, maya).unwrap());
        assert_eq!(all[0].chapters.len(), 1);
    }
}

mod engagement_integration_tests {
    use super::*;

    #[test]
    fn test_toggle_like_reports_committed_count() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let other = create_user(&db, "other");
        let story = publish(&db, maya, story_input("Liked", StoryType::OneTime));

        let t = engagement::toggle_like(&db, reader, story.id).unwrap();
        assert!(t.active);
        assert_eq!(t.count, 1);

        let t = engagement::toggle_like(&db, other, story.id).unwrap();
        assert_eq!(t.count, 2);

        let t = engagement::toggle_like(&db, reader, story.id).unwrap();
        assert!(!t.active);
        assert_eq!(t.count, 1);

        assert_eq!(stories::get_story(&db, story.id).unwrap().unwrap().likes_count, 1);
    }

    #[test]
    fn test_toggle_bookmark_and_viewer_state() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let story = publish(&db, maya, story_input("Saved", StoryType::OneTime));

        let t = engagement::toggle_bookmark(&db, reader, story.id).unwrap();
        assert!(t.active);
        assert_eq!(t.count, 1);

        let state = engagement::viewer_state(&db, reader, story.id).unwrap();
        assert!(state.bookmarked);
        assert!(!state.liked);
        assert!(!state.subscribed);
    }

    #[test]
    fn test_subscriptions_only_for_series() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let standalone = publish(&db, maya, story_input("Once", StoryType::OneTime));
        let series_root = publish(&db, maya, story_input("Ongoing", StoryType::Series));

        let err = engagement::toggle_subscription(&db, reader, standalone.id).unwrap_err();
        assert!(is_invalid(&err));

        let t = engagement::toggle_subscription(&db, reader, series_root.id).unwrap();
        assert!(t.active);
        assert_eq!(t.count, 1);
    }

    #[test]
    fn test_subscribing_through_a_chapter_subscribes_to_the_work() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let other = create_user(&db, "other");
        let root = publish(&db, maya, story_input("Ongoing", StoryType::Series));
        let chapter = publish(&db, maya, chapter_input("Part two", root.id));

        let t = engagement::toggle_subscription(&db, reader, chapter.id).unwrap();
        assert!(t.active);
        assert_eq!(t.count, 1);
        assert!(engagement::viewer_state(&db, reader, root.id).unwrap().subscribed);
        assert!(!engagement::viewer_state(&db, reader, chapter.id).unwrap().subscribed);

        // the count covers everyone subscribed to the work
        let t = engagement::toggle_subscription(&db, other, root.id).unwrap();
        assert_eq!(t.count, 2);

        let t = engagement::toggle_subscription(&db, reader, chapter.id).unwrap();
        assert!(!t.active);
        assert_eq!(t.count, 1);
        assert!(!engagement::viewer_state(&db, reader, root.id).unwrap().subscribed);
    }

    #[test]
    fn test_drafts_cannot_be_engaged_with() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let draft = stories::create_story(
            &db,
            &ContentConfig::default(),
            maya,
            story_input("Secret", StoryType::OneTime),
            SaveMode::Draft,
        )
        .unwrap();

        assert!(is_not_found(&engagement::toggle_like(&db, reader, draft.id).unwrap_err()));
        assert!(is_not_found(&engagement::toggle_like(&db, reader, 4242).unwrap_err()));
    }

    #[test]
    fn test_follow_toggle_updates_counters() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");

        assert!(is_invalid(&engagement::toggle_follow(&db, maya, maya).unwrap_err()));
        assert!(is_not_found(&engagement::toggle_follow(&db, reader, 9999).unwrap_err()));

        let t = engagement::toggle_follow(&db, reader, maya).unwrap();
        assert!(t.active);
        assert_eq!(t.count, 1);
        assert!(engagement::is_following(&db, reader, maya).unwrap());
        assert_eq!(profiles::get_profile(&db, reader).unwrap().unwrap().following_count, 1);

        let t = engagement::toggle_follow(&db, reader, maya).unwrap();
        assert!(!t.active);
        assert_eq!(t.count, 0);
        assert!(!engagement::is_following(&db, reader, maya).unwrap());
    }
}

mod comment_integration_tests {
    use super::*;

    #[test]
    fn test_comments_and_replies() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let reader = create_user(&db, "reader");
        let story = publish(&db, maya, story_input("Talk", StoryType::OneTime));

        let first = comments::post_comment(&db, reader, story.id, None, "  First!  ").unwrap();
        assert_eq!(first.comment.content, "First!");
        assert_eq!(first.author.as_ref().map(|a| a.username.as_str()), Some("reader"));

        let reply = comments::post_comment(&db, maya, story.id, Some(first.comment.id), "Thank you").unwrap();
        comments::post_comment(&db, reader, story.id, Some(reply.comment.id), "Anytime").unwrap();
        comments::post_comment(&db, reader, story.id, None, "Second").unwrap();

        let threads = comments::list_comments(&db, story.id).unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.content, "First!");
        assert_eq!(threads[1].comment.content, "Second");
        let replies: Vec<&str> = threads[0]
            .replies
            .iter()
            .map(|r| r.comment.content.as_str())
            .collect();
        assert_eq!(replies, vec!["Thank you", "Anytime"]);

        assert_eq!(stories::get_story(&db, story.id).unwrap().unwrap().comments_count, 4);
    }

    #[test]
    fn test_comment_validation() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let a = publish(&db, maya, story_input("A", StoryType::OneTime));
        let b = publish(&db, maya, story_input("B", StoryType::OneTime));

        assert!(is_invalid(&comments::post_comment(&db, maya, a.id, None, "   ").unwrap_err()));
        assert!(is_invalid(
            &comments::post_comment(&db, maya, a.id, None, &"x".repeat(2001)).unwrap_err()
        ));
        assert!(is_not_found(&comments::post_comment(&db, maya, 777, None, "hi").unwrap_err()));

        let on_a = comments::post_comment(&db, maya, a.id, None, "on a").unwrap();
        let err = comments::post_comment(&db, maya, b.id, Some(on_a.comment.id), "wrong thread").unwrap_err();
        assert!(is_not_found(&err));
    }
}

mod profile_integration_tests {
    use super::*;

    #[test]
    fn test_update_profile() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");

        let updated = profiles::update_profile(
            &db,
            maya,
            UpdateProfile {
                display_name: Some(" Maya R. ".into()),
                bio: Some("Writes at night.".into()),
                website: Some("https://maya.example.com".into()),
                avatar_url: Some("/media/1-abc.png".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Maya R."));
        assert_eq!(updated.avatar_url.as_deref(), Some("/media/1-abc.png"));

        // blank fields clear, a missing avatar keeps the current one
        let cleared = profiles::update_profile(
            &db,
            maya,
            UpdateProfile {
                bio: Some("   ".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cleared.bio, None);
        assert_eq!(cleared.avatar_url.as_deref(), Some("/media/1-abc.png"));

        let err = profiles::update_profile(
            &db,
            maya,
            UpdateProfile {
                website: Some("not a url".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(is_invalid(&err));

        assert!(is_not_found(
            &profiles::update_profile(&db, 9999, UpdateProfile::default()).unwrap_err()
        ));
    }

    #[test]
    fn test_authors_directory() {
        let db = create_test_db();
        create_user(&db, "first");
        create_user(&db, "second");

        assert_eq!(profiles::count_authors(&db).unwrap(), 2);
        assert_eq!(profiles::list_authors(&db, 1, 0).unwrap().len(), 1);
        let found = profiles::get_profile_by_username(&db, " SECOND ").unwrap().unwrap();
        assert_eq!(found.username, "second");
    }
}

mod web_integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use heartecho::web::{self, AppState};
    use heartecho::Config;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(db: &Database) -> Router {
        app_with_config(db, Config::default())
    }

    fn app_with_config(db: &Database, config: Config) -> Router {
        let state = AppState::new(config, db.clone()).unwrap();
        web::router(Arc::new(state)).unwrap()
    }

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];
    const BOUNDARY: &str = "heartecho-form-boundary";

    fn settings_form(website: &str, avatar: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        let fields = [
            ("display_name", "Maya"),
            ("bio", ""),
            ("location", ""),
            ("website", website),
        ];
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(avatar);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn files_in(dir: &std::path::Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn session_cookie(response: &axum::response::Response) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("session="))
            .and_then(|v| v.split(';').next())
            .map(String::from)
    }

    #[tokio::test]
    async fn test_public_pages_render() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let root = publish(&db, maya, story_input("Heartbreak Hotel", StoryType::Series));
        publish(&db, maya, chapter_input("Checking out", root.id));

        for uri in ["/", "/stories", "/authors", "/profile/maya", "/signin", "/signup"] {
            let response = app(&db).oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }

        let response = app(&db)
            .oneshot(get(&format!("/stories/{}", root.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Heartbreak Hotel"));
        assert!(html.contains("Checking out"));
    }

    #[tokio::test]
    async fn test_missing_and_draft_stories_are_404() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let draft = stories::create_story(
            &db,
            &ContentConfig::default(),
            maya,
            story_input("Hidden", StoryType::OneTime),
            SaveMode::Draft,
        )
        .unwrap();

        let response = app(&db).oneshot(get("/stories/999", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(&db)
            .oneshot(get(&format!("/stories/{}", draft.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(&db).oneshot(get("/no/such/page", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_pages_redirect_and_api_rejects_anonymous() {
        let db = create_test_db();

        let response = app(&db).oneshot(get("/dashboard", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/signin"
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/stories/1/like")
            .body(Body::empty())
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signup_then_write_and_like() {
        let db = create_test_db();

        let request = Request::builder()
            .method("POST")
            .uri("/signup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "username=maya&email=maya%40example.com&display_name=&password=secret123&password_confirm=secret123",
            ))
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response).expect("session cookie");

        for uri in ["/dashboard", "/write", "/settings"] {
            let response = app(&db).oneshot(get(uri, Some(&cookie))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/write")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "id=&title=First+light&content=It+was+morning.&excerpt=&story_type=one_time&genre=&tags=dawn%2C+hope&series_id=&chapter_number=&action=publish",
            ))
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let listed = stories::list_published(&db, 10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        let story_id = listed[0].story.id;
        assert_eq!(listed[0].story.tags, vec!["dawn", "hope"]);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/stories/{}/like", story_id))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["active"], true);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_write_form_rerenders_with_error() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let token = auth::create_session(&db, maya, 1).unwrap();
        let cookie = format!("session={}", token);

        let request = Request::builder()
            .method("POST")
            .uri("/write")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=&content=words&tags=&action=publish"))
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Title cannot be empty"));
    }

    #[tokio::test]
    async fn test_comment_api() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let story = publish(&db, maya, story_input("Open thread", StoryType::OneTime));
        let token = auth::create_session(&db, maya, 1).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/stories/{}/comments", story.id))
            .header(header::COOKIE, format!("session={}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content":"Hello there","parent_id":null}"#))
            .unwrap();
        let response = app(&db).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app(&db)
            .oneshot(get(&format!("/api/stories/{}/comments", story.id), None))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body[0]["content"], "Hello there");
        assert_eq!(body[0]["author"]["username"], "maya");
    }

    #[tokio::test]
    async fn test_comments_of_unpublished_story_are_hidden() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let story = publish(&db, maya, story_input("Second thoughts", StoryType::OneTime));
        comments::post_comment(&db, maya, story.id, None, "Early feedback").unwrap();

        stories::update_story(
            &db,
            &ContentConfig::default(),
            maya,
            story.id,
            story_input("Second thoughts", StoryType::OneTime),
            SaveMode::Draft,
        )
        .unwrap();

        let response = app(&db)
            .oneshot(get(&format!("/api/stories/{}/comments", story.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(&db)
            .oneshot(get("/api/stories/4242/comments", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_settings_leave_no_avatar_behind() {
        let db = create_test_db();
        let maya = create_user(&db, "maya");
        let cookie = format!("session={}", auth::create_session(&db, maya, 1).unwrap());

        let upload_dir =
            std::env::temp_dir().join(format!("heartecho-settings-{}", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.media.upload_dir = upload_dir.to_string_lossy().into_owned();

        let post = |website: &str| {
            Request::builder()
                .method("POST")
                .uri("/settings")
                .header(header::COOKIE, &cookie)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(settings_form(website, PNG_HEADER)))
                .unwrap()
        };

        let response = app_with_config(&db, config.clone())
            .oneshot(post("not a url"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(files_in(&upload_dir).is_empty());
        let profile = profiles::get_profile(&db, maya).unwrap().unwrap();
        assert_eq!(profile.avatar_url, None);
        assert_eq!(profile.display_name, None);

        let response = app_with_config(&db, config)
            .oneshot(post("https://maya.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(files_in(&upload_dir).len(), 1);
        let profile = profiles::get_profile(&db, maya).unwrap().unwrap();
        assert!(profile.avatar_url.unwrap().starts_with("/media/"));

        let _ = std::fs::remove_dir_all(&upload_dir);
    }

    #[tokio::test]
    async fn test_health_and_static_assets() {
        let db = create_test_db();

        let response = app(&db).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&db).oneshot(get("/static/style.css", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/css"));

        let response = app(&db).oneshot(get("/media/..%2Fsecret", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
