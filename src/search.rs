//! `docsearch search`: run a keyword search from command-line flags and
//! print the response as JSON.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use docsearch_core::populate::PopulateSpec;
use docsearch_core::query::{Projection, SortSpec, Stage};
use docsearch_core::{SearchOptions, SearchResponse};

use crate::config::Config;
use crate::context::SearchContext;

/// Raw search flags, as given on the command line.
#[derive(Debug, Default, Clone)]
pub struct SearchArgs {
    pub fields: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub sort: Vec<String>,
    pub conditions: Option<String>,
    pub aggregate: Option<String>,
    pub populate: Vec<String>,
}

fn parse_json(flag: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--{} is not valid JSON", flag))
}

/// `PATH`, `PATH=field1,field2` to keep only those fields of the populated
/// documents, or `PATH=-field1,-field2` to omit them. Kept and omitted
/// fields cannot be mixed.
pub fn parse_populate(raw: &str) -> Result<PopulateSpec> {
    let (path, fields) = match raw.split_once('=') {
        Some((path, fields)) => (path.trim(), Some(fields)),
        None => (raw.trim(), None),
    };
    if path.is_empty() {
        bail!("--populate needs a path");
    }
    let spec = PopulateSpec::new(path);
    let Some(fields) = fields else {
        return Ok(spec);
    };

    let fields: Vec<&str> = fields.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
    let omitted: Vec<&str> = fields.iter().copied().filter_map(|f| f.strip_prefix('-')).collect();
    let projection = if omitted.is_empty() {
        Projection::include(fields)
    } else if omitted.len() == fields.len() {
        Projection::exclude(omitted)
    } else {
        bail!("--populate {}: cannot mix kept and omitted fields", path);
    };
    Ok(spec.fields(projection))
}

impl SearchArgs {
    /// Output projection from `--fields`.
    pub fn projection(&self) -> Result<Option<Projection>> {
        self.fields
            .as_deref()
            .map(|raw| Projection::from_value(&parse_json("fields", raw)?))
            .transpose()
    }

    pub fn options(&self) -> Result<SearchOptions> {
        let mut options = SearchOptions::new();
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        if let Some(skip) = self.skip {
            options = options.skip(skip);
        }
        if !self.sort.is_empty() {
            options = options.sort(SortSpec::parse(&self.sort.join(","))?);
        }
        if let Some(raw) = &self.conditions {
            match parse_json("where", raw)? {
                Value::Object(filter) => options = options.conditions(filter),
                _ => bail!("--where must be a JSON object"),
            }
        }
        if let Some(raw) = &self.aggregate {
            options = options.aggregate(Stage::parse_pipeline(&parse_json("aggregate", raw)?)?);
        }
        for raw in &self.populate {
            options = options.populate(parse_populate(raw)?);
        }
        Ok(options)
    }
}

pub async fn search_model(
    config: &Config,
    model_name: &str,
    query: &str,
    args: &SearchArgs,
) -> Result<SearchResponse> {
    let fields = args.projection()?;
    let options = args.options()?;

    let ctx = SearchContext::open(config).await?;
    let model = ctx.model(model_name).await?;
    let response = model.search_with(query, fields.as_ref(), &options).await;
    ctx.close().await;
    response
}

pub async fn run_search(config: &Config, model_name: &str, query: &str, args: &SearchArgs) -> Result<()> {
    let response = search_model(config, model_name, query, args).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn populate_flag_with_fields() {
        let spec = parse_populate("author=name, email").unwrap();
        assert_eq!(spec.path, "author");
        assert_eq!(spec.fields, Some(Projection::include(["name", "email"])));
        assert_eq!(parse_populate("author").unwrap().fields, None);
        assert!(parse_populate("=name").is_err());
    }

    #[test]
    fn populate_flag_omitting_fields() {
        let spec = parse_populate("author=-email,-_keywords").unwrap();
        assert_eq!(spec.fields, Some(Projection::exclude(["email", "_keywords"])));
        assert!(parse_populate("author=name,-email").is_err());
    }

    #[test]
    fn flags_become_options() {
        let args = SearchArgs {
            limit: Some(3),
            skip: Some(1),
            sort: vec!["-index".to_string(), "title".to_string()],
            conditions: Some(r#"{"index": {"$gt": 2}}"#.to_string()),
            populate: vec!["author".to_string()],
            ..SearchArgs::default()
        };
        let options = args.options().unwrap();
        assert_eq!(options.limit, Some(3));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.sort, Some(SortSpec::new().desc("index").asc("title")));
        assert_eq!(
            options.conditions,
            json!({"index": {"$gt": 2}}).as_object().cloned()
        );
        assert_eq!(options.populate, vec![PopulateSpec::new("author")]);
        assert!(options.aggregate.is_none());
    }

    #[test]
    fn malformed_flags_are_errors() {
        let bad_where = SearchArgs {
            conditions: Some("[1]".to_string()),
            ..SearchArgs::default()
        };
        assert!(bad_where.options().is_err());

        let bad_fields = SearchArgs {
            fields: Some("{not json".to_string()),
            ..SearchArgs::default()
        };
        assert!(bad_fields.projection().is_err());

        let bad_pipeline = SearchArgs {
            aggregate: Some(r#"[{"$group": {}}]"#.to_string()),
            ..SearchArgs::default()
        };
        assert!(bad_pipeline.options().is_err());
    }
}
