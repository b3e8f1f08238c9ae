//! Entity normalization.
//!
//! Any object carrying an `id` is an entity. Its fields are stored once, at the top level of
//! the cache under `node|{"id":"<id>"}`, and every place the entity appears only stores
//! `{"id": <id>}`. Reading and planning follow the reference back to the shared slot, so an
//! entity fetched through one query answers every other query selecting it.
use apollo_compiler::Node;
use apollo_compiler::ast;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::extension::Extension;
use crate::extension::Visit;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::merge::MergeContext;
use crate::planner::PlanContext;
use crate::read::ReadContext;

const ID: &str = "id";
const ENTITY_FIELD: &str = "node";

/// Entity normalization configuration
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct NormalizeEntitiesConfig {
    /// Store every object carrying an `id` once, and reference it from everywhere else.
    pub enabled: bool,
}

/// Stores entities once, at the top level of the cache.
#[derive(Clone, Debug, Default)]
pub struct NormalizeEntities;

impl NormalizeEntities {
    pub fn new() -> Self {
        NormalizeEntities
    }
}

/// The top-level cache key of the entity `id`.
///
/// This is also the cache key of a `node(id: "<id>")` root field, so such a field reads the
/// entity directly.
pub fn entity_key(id: &str) -> String {
    let mut arguments = serde_json::Map::new();
    arguments.insert(ID.to_string(), serde_json::Value::String(id.to_string()));
    format!("{ENTITY_FIELD}|{}", serde_json::Value::Object(arguments))
}

/// The id of an entity: a string or a number under `id`.
fn entity_id(value: &Value) -> Option<String> {
    match value.member(ID)? {
        Value::String(id) => Some(id.as_str().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl Extension for NormalizeEntities {
    fn name(&self) -> &'static str {
        "normalize_entities"
    }

    fn merge_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut MergeContext<'_>,
    ) -> Visit {
        let result = context.result();
        let (Some(id), Some(id_value)) = (entity_id(result), result.member(ID)) else {
            return Visit::Continue;
        };
        let key = entity_key(&id);
        let entity = Path::from_key(key.as_str());

        // a `node(id:)` field already writes into the entity slot
        if *context.cache_path() != entity
            && let Some(owner) = context.current_mut()
        {
            *owner = Object::new();
            owner.insert(ID, id_value.clone());
        }
        if context.top_level_object_mut(&key).is_some() {
            context.redirect(entity);
        }
        Visit::Continue
    }

    fn read_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut ReadContext<'_>,
    ) -> Visit {
        let entity =
            entity_id(context.cache()).and_then(|id| context.root().member(&entity_key(&id)));
        if let Some(entity) = entity {
            context.redirect(entity);
        }
        Visit::Continue
    }

    fn plan_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut PlanContext<'_>,
    ) -> Visit {
        let entity =
            entity_id(context.cache()).and_then(|id| context.root().member(&entity_key(&id)));
        if let Some(entity) = entity {
            tracing::trace!(entity = ?entity.member(ID), "planning against the entity slot");
            context.redirect(entity);
        }
        Visit::Continue
    }

    fn plan_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut PlanContext<'_>,
    ) -> Visit {
        // the next merge needs the id to find the entity slot again
        if entity_id(context.owner()).is_some() {
            context.require_field(ID);
        }
        Visit::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::merge::merge;
    use crate::planner::plan;
    use crate::read::read;
    use crate::test_utils::assert_plan;
    use crate::test_utils::object;
    use crate::test_utils::parse;

    fn extensions() -> Vec<Arc<dyn Extension>> {
        vec![Arc::new(NormalizeEntities::new())]
    }

    fn merged(previous: Value, query: &str, result: Value) -> Value {
        merge(&previous, &parse(query), &result, &Object::new(), &extensions()).unwrap()
    }

    #[test]
    fn entity_keys_match_node_fields() {
        assert_eq!(entity_key("10"), r#"node|{"id":"10"}"#);
    }

    #[test]
    fn entities_are_stored_once() {
        let cache = merged(
            json!({}),
            "{ user { id name friends { id name } } }",
            json!({
                "user": {
                    "id": "1",
                    "name": "Ada",
                    "friends": [{ "id": 2, "name": "Grace" }]
                }
            }),
        );

        assert_eq!(
            cache,
            json!({
                "user": { "id": "1" },
                "node|{\"id\":\"1\"}": { "id": "1", "name": "Ada", "friends": [{ "id": 2 }] },
                "node|{\"id\":\"2\"}": { "id": 2, "name": "Grace" }
            })
        );
    }

    #[test]
    fn entities_are_shared_between_queries() {
        let cache = merged(
            json!({}),
            "{ user { id name } }",
            json!({ "user": { "id": "1", "name": "Ada" } }),
        );
        let cache = merged(
            cache,
            "{ author { id email } }",
            json!({ "author": { "id": "1", "email": "ada@example.com" } }),
        );

        assert_eq!(
            read(
                &cache,
                &parse("{ user { name email } }"),
                &Object::new(),
                &extensions()
            )
            .unwrap(),
            json!({ "user": { "name": "Ada", "email": "ada@example.com" } })
        );
        assert_eq!(
            read(
                &cache,
                &parse(r#"{ node(id: "1") { name } }"#),
                &Object::new(),
                &extensions()
            )
            .unwrap(),
            json!({ "node": { "name": "Ada" } })
        );
    }

    #[test]
    fn node_fields_do_not_erase_the_entity() {
        let cache = merged(
            json!({ "node|{\"id\":\"1\"}": { "id": "1", "name": "Ada" } }),
            r#"{ node(id: "1") { id email } }"#,
            json!({ "node": { "id": "1", "email": "ada@example.com" } }),
        );

        assert_eq!(
            cache,
            json!({
                "node|{\"id\":\"1\"}": { "id": "1", "name": "Ada", "email": "ada@example.com" }
            })
        );
    }

    #[test]
    fn planning_follows_entities() {
        let cache = merged(
            json!({}),
            "{ user { id name friends { id name } } }",
            json!({
                "user": {
                    "id": "1",
                    "name": "Ada",
                    "friends": [{ "id": "2", "name": "Grace" }]
                }
            }),
        );

        let reduced = plan(
            &cache,
            &parse("{ user { id name email friends { id name } } }"),
            &Object::new(),
            &extensions(),
        )
        .unwrap();

        assert_plan(reduced, "{ user { email id } }");
    }

    #[test]
    fn planning_requests_the_id_of_incomplete_entities() {
        let reduced = plan(
            &json!({ "user": { "id": "1" } }),
            &parse("{ user { name } }"),
            &Object::new(),
            &extensions(),
        )
        .unwrap();

        assert_plan(reduced, "{ user { name id } }");
    }

    #[test]
    fn required_ids_do_not_revive_satisfied_fragments() {
        let reduced = plan(
            &json!({
                "user": { "id": "1" },
                "node|{\"id\":\"1\"}": { "id": "1", "name": "Ada" }
            }),
            &parse("{ user { ...UserFields } } fragment UserFields on User { id name }"),
            &Object::new(),
            &extensions(),
        )
        .unwrap();

        assert!(reduced.is_none());
    }

    #[test]
    fn entities_in_lists_are_reduced_through_their_slots() {
        let query = r#"
            query {
              user {
                id
                name
                dateOfBirth
                friends(first: 3) {
                  user {
                    id
                    name
                  }
                }
                otherUsers {
                  id
                  name
                }
                nestedUser {
                  id
                  about
                  foo
                }
              }
              someOtherUser {
                id
                interests
              }
            }
        "#;
        let cache = json!({
            "node|{\"id\":\"10\"}": {
                "id": "10",
                "name": "John Smith",
                "dateOfBirth": "2016-09-20 10:00",
                "interests": "What?!",
                "foo": "bar",
                "friends|{\"first\":\"3\"}": [
                    { "user": { "id": "11" } },
                    { "user": { "id": "12" } }
                ],
                "otherUsers": [{ "id": "13" }, { "id": "14" }],
                "nestedUser": { "id": "10" }
            },
            "node|{\"id\":\"11\"}": { "id": "11", "name": "Person 1" },
            "node|{\"id\":\"12\"}": { "id": "12" },
            "node|{\"id\":\"13\"}": { "id": "13", "name": "Person 3" },
            "node|{\"id\":\"14\"}": { "id": "14", "name": "Person 4" },
            "user": { "id": "10" },
            "someOtherUser": { "id": "10" }
        });
        let expected = r#"
            query {
              user {
                friends(first: 3) {
                  user {
                    name
                    id
                  }
                }
                nestedUser {
                  about
                  id
                }
                id
              }
            }
        "#;

        let reduced = plan(&cache, &parse(query), &Object::new(), &extensions()).unwrap();

        assert_plan(reduced, expected);
    }

    #[test]
    fn lists_missing_entity_fields_are_requested_whole() {
        let query = r#"
            fragment Bar on User {
              andAnotherConnection {
                id
                name
              }
            }

            fragment Foo on User {
              someOtherConnection {
                id
                name
              }
              ...Baz
            }

            query {
              user {
                id
                theUserName: name
                myOtherName: name
                about
                myFriends: friends { id, name }
                sameFriends: friends { id, name }
                otherFriends: friends(limit: 10) { id, name }
                otherFriendsDynamic: friends(limit: $someLimit) { id, name }
                moreFriendsDynamic: friends(limit: $someOtherLimit) { id, name }
                relatedFriends {
                  id
                  name
                  friends(limit: $justOne) { name }
                  ...Another
                  ...AndAnother
                }
                ...Foo
                ... on User {
                  interests
                }
                bestFriend {
                  friends { id, name, tags { name } }
                }
                dateOfBirth
              }
            }

            fragment Baz on User {
              reallyAnotherConnection {
                id
                name
              }
            }

            fragment Another on User {
              about
              interests
            }

            fragment AndAnother on User {
              id
            }
        "#;
        let cache = json!({
            "node|{\"id\":\"10\"}": {
                "id": "10",
                "name": "John Smith",
                "interests": null,
                "friends": [{ "id": "11" }, { "id": "12" }, { "id": "13" }, { "id": "14" }],
                "friends|{\"limit\":\"10\"}": [
                    { "id": "11" },
                    { "id": "12" },
                    { "id": "13" },
                    { "id": "14" },
                    { "id": "15" },
                    { "id": "16" }
                ],
                "friends|{\"limit\":\"3\"}": null,
                "relatedFriends": [{ "id": "11" }, { "id": "12" }, { "id": "13" }],
                "someOtherConnection": [{ "name": "Person 1" }, { "name": "Person 2" }],
                "reallyAnotherConnection": [{ "id": "20" }],
                "bestFriend": { "friends": [] }
            },
            "node|{\"id\":\"11\"}": {
                "id": "11",
                "name": "Person 1",
                "friends|{\"limit\":\"1\"}": [{ "id": "12", "name": "Person 2" }],
                "interests": "Some"
            },
            "node|{\"id\":\"12\"}": {
                "id": "12",
                "name": "Person 2",
                "friends|{\"limit\":\"1\"}": [{ "id": "11" }],
                "interests": "Some"
            },
            "node|{\"id\":\"13\"}": {
                "id": "13",
                "name": "Person 3",
                "friends|{\"limit\":\"1\"}": [{ "id": "11" }],
                "interests": "Some"
            },
            "node|{\"id\":\"14\"}": { "id": "14", "name": "Person 4" },
            "node|{\"id\":\"15\"}": { "id": "15", "name": "Person 5" },
            "node|{\"id\":\"16\"}": { "id": "16", "name": "Person 6" },
            "user": { "id": "10" }
        });
        let variables = json!({ "justOne": 1, "someLimit": 2, "someOtherLimit": 3 });
        let expected = r#"
            fragment Foo on User {
              someOtherConnection {
                id
                name
              }
              ...Baz
            }

            query {
              user {
                about
                otherFriendsDynamic: friends(limit: $someLimit) { id, name }
                relatedFriends {
                  id
                  name
                  friends(limit: $justOne) { name, id }
                  ...Another
                  ...AndAnother
                }
                ...Foo
                dateOfBirth
                id
              }
            }

            fragment Baz on User {
              reallyAnotherConnection {
                id
                name
              }
            }

            fragment Another on User {
              about
              interests
            }

            fragment AndAnother on User {
              id
            }
        "#;

        let reduced = plan(&cache, &parse(query), &object(variables), &extensions()).unwrap();

        assert_plan(reduced, expected);
    }
}
