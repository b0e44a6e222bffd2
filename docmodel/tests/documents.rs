mod common;

use docmodel::{
    bson::{Bson, DateTime, doc, oid::ObjectId},
    memory::InMemoryCollection,
    prelude::*,
};

use common::{books, user_type, users};

#[tokio::test]
async fn stores_a_user() {
    let users = users();
    let mut user = users.create(doc! { "name": "Aymeric" });

    users.save(&mut user).await.unwrap();

    let found = users.find().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name"), Some("Aymeric"));
}

#[test]
fn works_without_input() {
    let user = users().create(doc! {});

    assert!(user.is_new());
    assert_eq!(user.to_plain_data(), doc! { "verified": false });
}

#[test]
fn works_with_dates() {
    let user = users().create(doc! { "verifiedAt": DateTime::now() });
    assert!(user.get_datetime("verifiedAt").is_some());

    let parsed = users().create(doc! { "verifiedAt": "2018-08-11" });
    assert_eq!(
        parsed.get_datetime("verifiedAt"),
        Some(DateTime::from_millis(1_533_945_600_000))
    );
}

#[tokio::test]
async fn saving_assigns_an_id() {
    let users = users();
    let mut user = users.create(doc! { "name": "Aymeric" });

    users.save(&mut user).await.unwrap();

    assert!(matches!(user.id(), Some(Bson::ObjectId(_))));
    assert_eq!(user.to_plain_data().get("_id"), user.id());
}

#[test]
fn initializes_with_an_id() {
    let user = users().create(doc! { "_id": "test" });

    assert_eq!(user.id(), Some(&Bson::String("test".into())));
    assert!(!user.is_new());
}

mod created_user {
    use super::*;

    async fn saved() -> (Model<InMemoryCollection>, Document) {
        let users = users();
        let mut user = users.create(doc! { "name": "Aymeric" });
        users.save(&mut user).await.unwrap();
        (users, user)
    }

    #[tokio::test]
    async fn updates_without_recreating() {
        let (users, mut user) = saved().await;
        let id = users.find().await.unwrap()[0].id().cloned();

        user.set("name", "Lucie").unwrap();
        users.save(&mut user).await.unwrap();

        let found = users.find().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().cloned(), id);
        assert_eq!(found[0].get_str("name"), Some("Lucie"));
    }

    #[tokio::test]
    async fn removes_a_property() {
        let (users, mut user) = saved().await;

        user.set("name", Bson::Undefined).unwrap();
        assert_eq!(user.pending_changes().to_document(), doc! { "unset": { "name": "" } });
        users.save(&mut user).await.unwrap();

        assert!(user.get("name").is_none());
        let stored = users.find_one().await.unwrap().unwrap();
        assert!(stored.get("name").is_none());
        assert!(!stored.previous().contains_key("name"));
    }

    #[tokio::test]
    async fn null_is_stored() {
        let (users, mut user) = saved().await;

        user.set("name", Bson::Null).unwrap();
        users.save(&mut user).await.unwrap();

        let stored = users.find_one().await.unwrap().unwrap();
        assert_eq!(stored.previous().get("name"), Some(&Bson::Null));
    }

    #[tokio::test]
    async fn coerces_to_the_declared_type() {
        let (users, mut user) = saved().await;

        user.set("name", 123).unwrap();
        assert_eq!(user.get_str("name"), Some("123"));

        let other = users.create(doc! { "name": 123 });
        assert_eq!(other.get_str("name"), Some("123"));
        assert_eq!(other.to_plain_data(), doc! { "name": "123", "verified": false });
    }

    #[tokio::test]
    async fn applies_defaults() {
        let (_, user) = saved().await;

        assert_eq!(user.get_bool("verified"), Some(false));
    }

    #[tokio::test]
    async fn stores_booleans() {
        let (users, mut user) = saved().await;

        user.set("verified", true).unwrap();
        users.save(&mut user).await.unwrap();

        let found = users.find().await.unwrap();
        assert_eq!(found[0].get_bool("verified"), Some(true));
    }

    #[tokio::test]
    async fn ignores_unknown_properties() {
        let (users, _) = saved().await;
        let narrow = DocumentType::compile(
            "User",
            Schema::new().field("name", TypeDescriptor::String),
        )
        .unwrap();
        let narrow_users = Model::new(narrow, users.collection().clone());

        let found = narrow_users.find_one().await.unwrap().unwrap();
        assert!(found.get("verified").is_none());
        assert_eq!(found.get_str("name"), Some("Aymeric"));
        assert!(!found.to_plain_data().contains_key("verified"));
    }
}

mod sub_models {
    use super::*;

    async fn saved() -> (Model<InMemoryCollection>, Document) {
        let books = books();
        let mut book = books.create(doc! {});
        books.save(&mut book).await.unwrap();
        (books, book)
    }

    #[tokio::test]
    async fn defines_sub_models() {
        let (_, book) = saved().await;

        let author = book.get_document("author").unwrap();
        assert_eq!(author.get_bool("verified"), Some(false));
        assert_eq!(author.document_type().name(), Some("User"));
        assert!(book.get_document("published").is_some());
    }

    #[test]
    fn accepts_initial_values() {
        let book = books()
            .create(doc! {
                "author": { "name": "Aymeric" },
                "published": { "at": "2018-08-11", "by": "Aymeric's press" },
            });

        let author = book.get_document("author").unwrap();
        assert_eq!(author.get_str("name"), Some("Aymeric"));
        assert_eq!(author.get_bool("verified"), Some(false));

        let published = book.get_document("published").unwrap();
        assert!(published.get_datetime("at").is_some());
        assert_eq!(published.get_str("by"), Some("Aymeric's press"));
    }

    #[tokio::test]
    async fn updates_a_sub_model() {
        let (books, mut book) = saved().await;

        book.get_document_mut("author")
            .unwrap()
            .set("name", "Aymeric")
            .unwrap();
        assert_eq!(
            book.pending_changes().to_document(),
            doc! { "set": { "author.name": "Aymeric" } }
        );
        books.save(&mut book).await.unwrap();

        let mut plain = book.to_plain_data();
        assert!(matches!(plain.remove("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(
            plain,
            doc! {
                "author": { "name": "Aymeric", "verified": false },
                "published": {},
                "readers": [],
                "readerIds": [],
            }
        );

        let found = books.find().await.unwrap();
        assert_eq!(
            found[0].get_document("author").unwrap().get_str("name"),
            Some("Aymeric")
        );
    }

    #[tokio::test]
    async fn arrays_default_to_empty() {
        let (_, book) = saved().await;

        assert_eq!(book.get_array("readers"), Some(&[][..]));
        assert_eq!(book.get_array("readerIds"), Some(&[][..]));
    }

    #[test]
    fn arrays_accept_initial_values() {
        let book = books()
            .create(doc! {
                "readers": [{ "name": "Aymeric" }, { "name": "Lucie" }],
                "readerIds": [1, 2],
            });

        let readers = book.get_array("readers").unwrap();
        assert_eq!(readers.len(), 2);
        assert_eq!(readers[1].as_document().unwrap().get_str("name"), Some("Lucie"));
        assert_eq!(
            book.to_plain_data().get("readerIds"),
            Some(&Bson::Array(vec!["1".into(), "2".into()]))
        );
    }

    #[tokio::test]
    async fn updates_arrays() {
        let (books, mut book) = saved().await;

        book.set("readers", vec![Bson::Document(doc! { "name": "Aymeric" })])
            .unwrap();
        book.push("readerIds", 1).unwrap();
        books.save(&mut book).await.unwrap();

        let found = books.find_one().await.unwrap().unwrap();
        assert_eq!(
            found.get_array("readers").unwrap()[0]
                .as_document()
                .unwrap()
                .get_str("name"),
            Some("Aymeric")
        );
        assert_eq!(
            found.previous().get("readerIds"),
            Some(&Bson::Array(vec!["1".into()]))
        );
    }
}

#[test]
fn default_arrays_are_not_shared() {
    let books = books();
    let mut first = books.create(doc! {});
    let second = books.create(doc! {});

    first.push("readerIds", "x").unwrap();

    assert_eq!(first.get_array("readerIds").map(<[FieldValue]>::len), Some(1));
    assert_eq!(second.get_array("readerIds").map(<[FieldValue]>::len), Some(0));
}

#[test]
fn schema_errors_surface_at_definition_time() {
    let invalid_default = DocumentType::compile(
        "Counter",
        Schema::new().field("count", TypeDescriptor::Number.with_default("many")),
    );
    assert!(matches!(invalid_default, Err(ModelError::Configuration(_))));

    let reserved = DocumentType::compile(
        "Weird",
        Schema::new().field("_id", TypeDescriptor::String),
    );
    assert!(matches!(reserved, Err(ModelError::Configuration(_))));
}

#[tokio::test]
async fn inserting_a_taken_id_is_rejected() {
    let users = users();
    let id = ObjectId::new();

    let mut user = users.create(doc! { "_id": id, "name": "a" });
    users.collection().insert_one(user.to_plain_data()).await.unwrap();

    // With an id, saving updates the stored row instead of inserting again.
    user.set("name", "b").unwrap();
    users.save(&mut user).await.unwrap();

    let duplicate = users.collection().insert_one(doc! { "_id": id }).await;
    assert!(matches!(duplicate, Err(ModelError::DuplicateKey(_, _))));
    assert_eq!(users.collection().len().await, 1);
    assert_eq!(
        users.find_one().await.unwrap().unwrap().get_str("name"),
        Some("b")
    );
}

#[test]
fn converts_to_json_and_typed_values() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Plain {
        name: String,
        verified: bool,
    }

    let user = Document::from_json(
        user_type(),
        &serde_json::json!({ "name": "Aymeric", "age": 3 }),
    )
    .unwrap();

    assert_eq!(
        user.decode::<Plain>().unwrap(),
        Plain {
            name: "Aymeric".into(),
            verified: false,
        }
    );
    assert_eq!(
        user.to_json().unwrap(),
        serde_json::json!({ "name": "Aymeric", "verified": false })
    );
}

#[tokio::test]
async fn rows_with_uncoercible_values_still_load() {
    let collection = InMemoryCollection::builder("users")
        .rows([
            doc! { "_id": 1, "name": "ann", "verified": true },
            doc! { "_id": 2, "name": "bob", "verified": "yes" },
        ])
        .build()
        .await
        .unwrap();
    let users = Model::new(user_type(), collection);

    let found = users.find().await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].get_bool("verified"), Some(true));
    assert_eq!(found[1].get("verified"), Some(&FieldValue::Scalar("yes".into())));
    assert_eq!(found[1].get_str("name"), Some("bob"));

    let mut legacy = users.field("name").equals("bob").find_one().await.unwrap().unwrap();
    legacy.set("verified", false).unwrap();
    users.save(&mut legacy).await.unwrap();

    assert_eq!(
        users.collection().snapshot().await[1].get("verified"),
        Some(&Bson::Boolean(false))
    );
}
