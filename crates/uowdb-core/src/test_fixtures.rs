use crate::{
    db::{Engine, Instance},
    model::{EntityModel, FieldKind, FieldModel},
    traits::{EntityKind, Path},
    value::Value,
};

///
/// Movie
///
/// Fixture entity mirroring a movie catalog row: auto-incrementing
/// numeric key, every attribute independently nullable.
///

pub(crate) struct Movie;

impl Path for Movie {
    const PATH: &'static str = "fixtures::Movie";
}

static MOVIE_FIELDS: &[FieldModel] = &[
    FieldModel {
        name: "title",
        kind: FieldKind::Text,
    },
    FieldModel {
        name: "budget",
        kind: FieldKind::Int,
    },
    FieldModel {
        name: "homepage",
        kind: FieldKind::Text,
    },
    FieldModel {
        name: "overview",
        kind: FieldKind::Text,
    },
    FieldModel {
        name: "popularity",
        kind: FieldKind::Decimal,
    },
    FieldModel {
        name: "release_date",
        kind: FieldKind::Date,
    },
    FieldModel {
        name: "revenue",
        kind: FieldKind::Int,
    },
    FieldModel {
        name: "runtime",
        kind: FieldKind::Int,
    },
    FieldModel {
        name: "status",
        kind: FieldKind::Text,
    },
    FieldModel {
        name: "tagline",
        kind: FieldKind::Text,
    },
    FieldModel {
        name: "vote_average",
        kind: FieldKind::Decimal,
    },
    FieldModel {
        name: "vote_count",
        kind: FieldKind::Int,
    },
];

static MOVIE_MODEL: EntityModel = EntityModel {
    path: Movie::PATH,
    entity_name: "Movie",
    primary_key: "movie_id",
    fields: MOVIE_FIELDS,
};

impl EntityKind for Movie {
    const MODEL: &'static EntityModel = &MOVIE_MODEL;
}

/// Fresh engine with the movie table registered.
pub(crate) fn movie_engine() -> Engine {
    let engine = Engine::new();
    engine.register::<Movie>();

    engine
}

/// Transient movie with an explicit key and title.
pub(crate) fn titled_movie(key: u64, title: &str) -> Instance<Movie> {
    let movie: Instance<Movie> = Instance::with_key(key);
    movie
        .set("title", Some(Value::from(title)))
        .expect("fixture field");

    movie
}
