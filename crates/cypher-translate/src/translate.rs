use crate::{
    cypher::Block,
    selection::ResolveTree,
    translator::{TranslateContext, Translator},
    CypherQuery, Result,
};

/// Root list field of a node, interface or union type.
#[tracing::instrument(skip_all, fields(operation = "read", type_name = %type_name))]
pub fn translate_read(context: TranslateContext<'_>, type_name: &str, tree: &ResolveTree) -> Result<CypherQuery> {
    run(context, |translator| {
        let composite = translator.composite(type_name)?;
        translator.root_read(composite, tree)
    })
}

/// Root `xAggregate` field.
#[tracing::instrument(skip_all, fields(operation = "aggregate", type_name = %type_name))]
pub fn translate_aggregate(context: TranslateContext<'_>, type_name: &str, tree: &ResolveTree) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_aggregate(node, tree)
    })
}

/// Root `xConnection` field.
#[tracing::instrument(skip_all, fields(operation = "connection", type_name = %type_name))]
pub fn translate_connection(
    context: TranslateContext<'_>,
    type_name: &str,
    tree: &ResolveTree,
) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_connection(node, tree)
    })
}

/// Root field of the fulltext index `index`, projecting each node with its score.
#[tracing::instrument(skip_all, fields(operation = "fulltext", type_name = %type_name, index = %index))]
pub fn translate_fulltext(
    context: TranslateContext<'_>,
    type_name: &str,
    index: &str,
    tree: &ResolveTree,
) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_fulltext(node, index, tree)
    })
}

#[tracing::instrument(skip_all, fields(operation = "create", type_name = %type_name))]
pub fn translate_create(context: TranslateContext<'_>, type_name: &str, tree: &ResolveTree) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_create(node, tree)
    })
}

#[tracing::instrument(skip_all, fields(operation = "update", type_name = %type_name))]
pub fn translate_update(context: TranslateContext<'_>, type_name: &str, tree: &ResolveTree) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_update(node, tree)
    })
}

#[tracing::instrument(skip_all, fields(operation = "delete", type_name = %type_name))]
pub fn translate_delete(context: TranslateContext<'_>, type_name: &str, tree: &ResolveTree) -> Result<CypherQuery> {
    run(context, |translator| {
        let node = translator.node(type_name)?;
        translator.root_delete(node, tree)
    })
}

fn run<'a>(
    context: TranslateContext<'a>,
    compile: impl FnOnce(&mut Translator<'a>) -> Result<Block>,
) -> Result<CypherQuery> {
    let mut translator = Translator::new(context);

    match compile(&mut translator) {
        Ok(statement) => {
            let query = translator.finish(statement);
            tracing::debug!(cypher = %query.cypher, params = query.params.len(), "translated");
            Ok(query)
        }
        Err(error) => {
            tracing::debug!(%error, "translation failed");
            Err(error)
        }
    }
}
