use cypher_schema::Schema;
use cypher_translate::{
    bind_operation, offset_to_cursor, translate_connection, translate_create, translate_read, translate_update, AuthContext, Config,
    CypherQuery, Error, ResolveTree, TranslateContext,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Map, Value};

fn schema() -> Schema {
    Schema::from_json(json!({
        "nodes": [
            {
                "name": "Movie",
                "implements": ["Production"],
                "fields": [
                    { "name": "_id", "scalar": "ID" },
                    { "name": "id", "scalar": "ID", "required": true },
                    { "name": "title", "scalar": "String" },
                    { "name": "tags", "scalar": "String", "list": true },
                    {
                        "name": "actors",
                        "list": true,
                        "relationship": { "type": "ACTED_IN", "direction": "IN", "target": "Actor" }
                    }
                ]
            },
            {
                "name": "Series",
                "implements": ["Production"],
                "fields": [{ "name": "title", "scalar": "String" }]
            },
            {
                "name": "Actor",
                "fields": [
                    { "name": "name", "scalar": "String" },
                    {
                        "name": "actedIn",
                        "list": true,
                        "relationship": { "type": "ACTED_IN", "direction": "OUT", "target": "Production" }
                    }
                ]
            },
            {
                "name": "Post",
                "fields": [
                    { "name": "title", "scalar": "String" },
                    {
                        "name": "author",
                        "relationship": { "type": "HAS_POST", "direction": "IN", "target": "User" }
                    }
                ],
                "authorization": {
                    "filter": [{ "operations": ["READ"], "where": { "node": { "author": { "id": "$jwt.sub" } } } }],
                    "validate": [
                        { "operations": ["UPDATE"], "when": ["BEFORE"], "where": { "node": { "author": { "id": "$jwt.sub" } } } }
                    ]
                }
            },
            { "name": "User", "fields": [{ "name": "id", "scalar": "ID" }] }
        ],
        "interfaces": [{ "name": "Production", "fields": [{ "name": "title", "scalar": "String" }] }]
    }))
    .unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn root_field(document: &str) -> ResolveTree {
    init_tracing();

    let operation = bind_operation(document, None, &Map::new()).unwrap();
    operation.root_fields.into_iter().next().unwrap()
}

fn signed_in(sub: &str) -> AuthContext {
    AuthContext::authenticated(json!({ "sub": sub }).as_object().cloned().unwrap())
}

fn read(type_name: &str, document: &str) -> Result<CypherQuery, Error> {
    read_with(&Config::default(), &AuthContext::anonymous(), type_name, document)
}

fn read_with(config: &Config, auth: &AuthContext, type_name: &str, document: &str) -> Result<CypherQuery, Error> {
    let schema = schema();
    translate_read(TranslateContext::new(&schema, config, auth), type_name, &root_field(document))
}

fn where_clause(query: &CypherQuery) -> &str {
    query
        .cypher
        .lines()
        .find_map(|line| line.strip_prefix("WHERE "))
        .unwrap_or_default()
}

#[test]
fn membership_filter() {
    let query = read("Movie", r#"{ movies(where: { _id_IN: ["123"] }) { title } }"#).unwrap();

    insta::assert_snapshot!(query.cypher, @r"
    MATCH (this:Movie)
    WHERE this._id IN $param0
    RETURN this { .title } AS this
    ");
    assert_eq!(Value::Object(query.params), json!({ "param0": ["123"] }));
}

#[test]
fn negated_membership_on_a_required_field() {
    let query = read("Movie", r#"{ movies(where: { id_NOT_IN: ["123"] }) { title } }"#).unwrap();

    assert_eq!(where_clause(&query), "NOT (this.id IN $param0)");
    assert_eq!(Value::Object(query.params), json!({ "param0": ["123"] }));
}

#[test]
fn empty_membership_is_dropped() {
    let filtered = read("Movie", r#"{ movies(where: { _id_IN: [], title: "Up" }) { title } }"#).unwrap();
    let plain = read("Movie", r#"{ movies(where: { title: "Up" }) { title } }"#).unwrap();

    assert_eq!(filtered, plain);
}

#[rstest]
#[case::none(r#"{ actors_NONE: { name_IN: [] } }"#)]
#[case::all(r#"{ actors_ALL: { name_IN: [] } }"#)]
#[case::connection_all(r#"{ actorsConnection_ALL: { node: { name_IN: [] } } }"#)]
#[case::empty(r#"{ actors: {} }"#)]
fn relationship_filters_without_constraints_are_dropped(#[case] filter: &str) {
    let filtered = read("Movie", &format!("{{ movies(where: {filter}) {{ title }} }}")).unwrap();
    let plain = read("Movie", "{ movies { title } }").unwrap();

    assert_eq!(filtered, plain);
}

#[test]
fn translation_is_deterministic() {
    let document = r#"{ movies(where: { OR: [{ title: "Up" }, { actors_SOME: { name: "Keanu" } }] }) { title actors { name } } }"#;

    assert_eq!(read("Movie", document).unwrap(), read("Movie", document).unwrap());
}

#[rstest]
#[case::bare("actors", "EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 }")]
#[case::some("actors_SOME", "EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 }")]
#[case::none(
    "actors_NONE",
    "NOT (EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 })"
)]
#[case::single(
    "actors_SINGLE",
    "single(var1 IN [(this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 | 1] WHERE true)"
)]
#[case::all(
    "actors_ALL",
    "EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param0 } AND NOT (EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE NOT (this0.name = $param0) })"
)]
fn relationship_list_predicates(#[case] key: &str, #[case] expected: &str) {
    let document = format!(r#"{{ movies(where: {{ {key}: {{ name: "Keanu" }} }}) {{ title }} }}"#);
    let query = read("Movie", &document).unwrap();

    assert_eq!(where_clause(&query), expected);
}

#[test]
fn experimental_operators_follow_the_config() {
    let document = r#"{ movies(where: { title_MATCHES: "(?i)up" }) { title } }"#;
    let anonymous = AuthContext::anonymous();

    let error = read("Movie", document).unwrap_err();
    assert_eq!(
        error.to_string(),
        "The filter operator 'MATCHES' is not enabled for Movie.title"
    );

    let config = Config::from_toml_str("[filters.string]\nmatches = true").unwrap();
    let query = read_with(&config, &anonymous, "Movie", document).unwrap();
    assert_eq!(where_clause(&query), "this.title =~ $param0");
}

#[test]
fn relationship_rules_count_related_nodes() {
    let query = read_with(&Config::default(), &signed_in("u1"), "Post", "{ posts { title } }").unwrap();

    insta::assert_snapshot!(query.cypher, @r"
    MATCH (this:Post)
    CALL {
        WITH this
        MATCH (this)<-[:HAS_POST]-(this0:User)
        WHERE $jwt.sub IS NOT NULL AND this0.id = $jwt.sub
        RETURN count(this0) AS var1
    }
    WITH *
    WHERE $isAuthenticated = true AND var1 > 0
    RETURN this { .title } AS this
    ");
    assert_eq!(
        Value::Object(query.params),
        json!({ "isAuthenticated": true, "jwt": { "sub": "u1" } })
    );
}

#[test]
fn relationship_rules_guard_updates() {
    let schema = schema();
    let config = Config::default();
    let auth = signed_in("u1");
    let tree = root_field(r#"mutation { updatePosts(update: { title: "Draft" }) { posts { title } } }"#);

    let query = translate_update(TranslateContext::new(&schema, &config, &auth), "Post", &tree).unwrap();

    insta::assert_snapshot!(query.cypher, @r#"
    MATCH (this:Post)
    CALL {
        WITH this
        MATCH (this)<-[:HAS_POST]-(this0:User)
        WHERE $jwt.sub IS NOT NULL AND this0.id = $jwt.sub
        RETURN count(this0) AS var1
    }
    WITH *
    WHERE apoc.util.validatePredicate(NOT ($isAuthenticated = true AND var1 > 0), "FORBIDDEN", [0])
    SET this.title = $param0
    RETURN collect(DISTINCT this { .title }) AS data
    "#);
}

#[test]
fn pushing_a_scalar_appends_a_list() {
    let schema = schema();
    let config = Config::default();
    let auth = AuthContext::anonymous();
    let tree = root_field(r#"mutation { updateMovies(update: { tags_PUSH: "noir" }) { movies { title } } }"#);

    let query = translate_update(TranslateContext::new(&schema, &config, &auth), "Movie", &tree).unwrap();

    insta::assert_snapshot!(query.cypher, @r#"
    MATCH (this:Movie)
    CALL apoc.util.validate(this.tags IS NULL, "Property %s cannot be NULL", ["tags"])
    SET this.tags = this.tags + $param0
    RETURN collect(DISTINCT this { .title }) AS data
    "#);
    assert_eq!(Value::Object(query.params), json!({ "param0": ["noir"] }));
}

#[test]
fn connecting_through_an_interface_connects_each_implementation() {
    let schema = schema();
    let config = Config::default();
    let auth = AuthContext::anonymous();
    let tree = root_field(
        r#"
        mutation {
            createActors(input: [{
                name: "Tom"
                actedIn: { connect: [{ where: { node: { title: "Top Gun" } } }] }
            }]) {
                actors { name }
            }
        }
        "#,
    );

    let query = translate_create(TranslateContext::new(&schema, &config, &auth), "Actor", &tree).unwrap();

    insta::assert_snapshot!(query.cypher, @r"
    CALL {
        CREATE (this0:Actor)
        SET this0.name = $param0
        WITH *
        CALL {
            WITH this0
            OPTIONAL MATCH (this1:Movie)
            WHERE this1.title = $param1
            CALL {
                WITH *
                WITH collect(this1) AS connectedNodes, collect(this0) AS parentNodes
                UNWIND parentNodes AS this0
                UNWIND connectedNodes AS this1
                MERGE (this0)-[this2:ACTED_IN]->(this1)
            }
            WITH this0, this1
            RETURN count(*) AS var3
        }
        CALL {
            WITH this0
            OPTIONAL MATCH (this4:Series)
            WHERE this4.title = $param2
            CALL {
                WITH *
                WITH collect(this4) AS connectedNodes, collect(this0) AS parentNodes
                UNWIND parentNodes AS this0
                UNWIND connectedNodes AS this4
                MERGE (this0)-[this5:ACTED_IN]->(this4)
            }
            WITH this0, this4
            RETURN count(*) AS var6
        }
        RETURN this0
    }
    WITH [this0] AS created
    UNWIND created AS this
    RETURN collect(this { .name }) AS data
    ");
    assert_eq!(
        Value::Object(query.params),
        json!({ "param0": "Tom", "param1": "Top Gun", "param2": "Top Gun" })
    );
}

#[test]
fn root_connection_counts_before_paginating() {
    let schema = schema();
    let config = Config::default();
    let auth = AuthContext::anonymous();
    let tree = root_field("{ moviesConnection(first: 2) { totalCount edges { node { title } } } }");

    let query = translate_connection(TranslateContext::new(&schema, &config, &auth), "Movie", &tree).unwrap();

    let total = query.cypher.find("size(edges) AS totalCount").unwrap();
    let limit = query.cypher.find("LIMIT").unwrap();
    assert!(total < limit);
}

#[test]
fn cursors_past_the_last_offset_are_rejected() {
    let schema = schema();
    let config = Config::default();
    let auth = AuthContext::anonymous();
    let cursor = offset_to_cursor(usize::MAX);
    let tree = root_field(&format!(
        r#"{{ moviesConnection(first: 2, after: "{cursor}") {{ totalCount }} }}"#
    ));

    let error = translate_connection(TranslateContext::new(&schema, &config, &auth), "Movie", &tree).unwrap_err();

    assert!(matches!(error, Error::InvalidCursor { cursor: rejected } if rejected == cursor));
}

#[test]
fn unknown_types_are_rejected() {
    let error = read("Film", "{ films { title } }").unwrap_err();
    assert!(matches!(error, Error::UnknownType { .. }));
}
