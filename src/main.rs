use ormsql::sql::{
    create_crm_schema, BindMode, ComposerConfig, DdlGenerator, QueryComposer, SqlDialect,
};
use ormsql::{
    ComparisonOp, DeleteBuilder, Direction, Expression, Filter, InsertBuilder, Join, Operand,
    Query, SelectBuilder, UpdateBuilder,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn sample_queries() -> ormsql::ComposeResult<Vec<(&'static str, Query)>> {
    Ok(vec![
        (
            "Contacts of accounts in a city",
            SelectBuilder::new("Contact")
                .select(["id", "firstName", "lastName", "account.name"])
                .join(Join::left("account"))
                .filter(Filter::eq("account.billingCity", "Oslo"))
                .filter(Filter::eq("deleted", false))
                .order_by("lastName", Direction::Asc)
                .limit(20)
                .build()?
                .into(),
        ),
        (
            "Tag usage",
            SelectBuilder::new("Post")
                .select_as(Expression::column("tags.name"), "tag")
                .select_as(Expression::count_all(), "posts")
                .join(Join::inner("tags"))
                .group_by("tags.name")
                .having(Filter::compare(
                    Expression::count_all(),
                    ComparisonOp::Greater,
                    Operand::Value(1.into()),
                ))
                .build()?
                .into(),
        ),
        (
            "Link a post to a tag",
            InsertBuilder::new("PostTag")
                .values([("id", "1"), ("postId", "post-id"), ("tagId", "tag-id")])
                .update_set([("deleted", 0)])
                .build()?
                .into(),
        ),
        (
            "Rename an account",
            UpdateBuilder::new("Account")
                .set("name", "Acme")
                .filter(Filter::eq("id", "1"))
                .build()?
                .into(),
        ),
        (
            "Remove an account",
            DeleteBuilder::new("Account")
                .filter(Filter::eq("name", "test"))
                .build()?
                .into(),
        ),
    ])
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let schema = create_crm_schema();

    println!("=== Query Composer Demo ===\n");

    let queries = match sample_queries() {
        Ok(queries) => queries,
        Err(e) => {
            eprintln!("Invalid sample query: {}", e);
            std::process::exit(1);
        }
    };

    for dialect in [SqlDialect::Mysql, SqlDialect::Postgres, SqlDialect::Sqlite] {
        println!("--- {} ---", dialect.as_str());
        let composer = QueryComposer::new(&schema, dialect, ComposerConfig::default());
        let inline = QueryComposer::new(
            &schema,
            dialect,
            ComposerConfig {
                bind_mode: BindMode::Inline,
                ..Default::default()
            },
        );

        for (title, query) in &queries {
            println!("{}:", title);
            match composer.compose(query) {
                Ok(result) => {
                    println!("  {}", result.sql);
                    println!("  parameters: {:?}", result.parameters);
                }
                Err(e) => println!("  error: {}", e),
            }
            if let Ok(result) = inline.compose(query) {
                println!("  inline: {}", result.sql);
            }
        }
        println!();
    }

    println!("--- sqlite DDL ---");
    println!("{}", DdlGenerator::new(SqlDialect::Sqlite).generate_schema(&schema));
}
