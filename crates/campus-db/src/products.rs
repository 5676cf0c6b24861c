//! Products with an XML description column.
//!
//! SQLite has no XML type, so `details_xml` is TEXT and every write parses
//! the document first. A description looks like:
//!
//! ```xml
//! <product>
//!   <brand>XYZ</brand>
//!   <specs><cpu>Intel i7</cpu><ram>16GB</ram><storage>512GB SSD</storage></specs>
//! </product>
//! ```

use campus_types::{Product, ProductSpecs};
use rusqlite::{params, Connection};

use crate::catalog::tables;
use crate::error::DbError;

/// Fields read out of a `<product>` description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub brand: Option<String>,
    pub cpu: String,
    pub ram: String,
    pub storage: String,
}

fn child_text<'a, 'input>(node: roxmltree::Node<'a, 'input>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Parses a `<product>` description.
///
/// `brand` is optional; `<specs>` with non-empty `cpu`, `ram` and
/// `storage` children is required.
///
/// # Errors
///
/// Returns a description of the problem when the XML is not well formed,
/// the root is not `<product>`, or a required element is missing.
pub fn parse_details(xml: &str) -> Result<ProductDetails, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| e.to_string())?;
    let root = doc.root_element();
    if !root.has_tag_name("product") {
        return Err(format!(
            "expected <product> root, found <{}>",
            root.tag_name().name()
        ));
    }

    let specs = root
        .children()
        .find(|n| n.has_tag_name("specs"))
        .ok_or("missing <specs> element")?;
    let required = |tag: &str| {
        child_text(specs, tag)
            .map(str::to_string)
            .ok_or_else(|| format!("missing <specs><{tag}> element"))
    };

    Ok(ProductDetails {
        brand: child_text(root, "brand").map(str::to_string),
        cpu: required("cpu")?,
        ram: required("ram")?,
        storage: required("storage")?,
    })
}

/// Inserts one product after checking its description parses.
///
/// # Errors
///
/// Returns `DbError::MalformedXml` for an unusable description and
/// `DbError::ConstraintViolation` if SQLite rejects the row.
pub fn insert_product(conn: &Connection, product: &Product) -> Result<(), DbError> {
    parse_details(&product.details_xml).map_err(|reason| DbError::MalformedXml {
        entity: "product",
        key: product.product_id.to_string(),
        reason,
    })?;

    conn.execute(
        "INSERT INTO products (product_id, name, details_xml) VALUES (?1, ?2, ?3)",
        params![product.product_id, product.name, product.details_xml],
    )
    .map_err(|e| DbError::classify(tables::PRODUCTS, e))?;
    Ok(())
}

/// Lists every product with the specs extracted from its XML, by id.
///
/// # Errors
///
/// Returns `DbError::MalformedXml` if a stored description no longer
/// parses, or `DbError::Database` on SQL failure.
pub fn list_products(conn: &Connection) -> Result<Vec<ProductSpecs>, DbError> {
    let mut stmt =
        conn.prepare("SELECT product_id, name, details_xml FROM products ORDER BY product_id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Product {
            product_id: row.get(0)?,
            name: row.get(1)?,
            details_xml: row.get(2)?,
        })
    })?;

    let mut products = Vec::new();
    for row in rows {
        let product = row?;
        let details = parse_details(&product.details_xml).map_err(|reason| {
            DbError::MalformedXml {
                entity: "product",
                key: product.product_id.to_string(),
                reason,
            }
        })?;
        products.push(ProductSpecs {
            product_id: product.product_id,
            name: product.name,
            brand: details.brand,
            cpu: details.cpu,
            ram: details.ram,
            storage: details.storage,
        });
    }

    tracing::debug!(count = products.len(), "listed products");
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::campus_tables;
    use crate::fixtures::{load_fixtures, sample_fixtures};
    use crate::pool::open_in_memory;
    use crate::schema::{RerunPolicy, SchemaManager};

    fn test_db() -> Connection {
        let conn = open_in_memory().expect("should open");
        SchemaManager::new(campus_tables(), RerunPolicy::FailIfExists)
            .expect("valid schema")
            .create_all(&conn)
            .expect("schema should be created");
        load_fixtures(&conn, &sample_fixtures()).expect("fixtures should load");
        conn
    }

    #[test]
    fn parses_specs_with_declaration() {
        let details = parse_details(
            r#"<?xml version="1.0"?><product><brand>XYZ</brand><specs><cpu>Intel i7</cpu><ram>16GB</ram><storage>512GB SSD</storage></specs></product>"#,
        )
        .expect("should parse");
        assert_eq!(details.brand.as_deref(), Some("XYZ"));
        assert_eq!(details.cpu, "Intel i7");
        assert_eq!(details.ram, "16GB");
        assert_eq!(details.storage, "512GB SSD");
    }

    #[test]
    fn brand_is_optional() {
        let details = parse_details(
            "<product><specs><cpu>M2</cpu><ram>8GB</ram><storage>256GB</storage></specs></product>",
        )
        .expect("should parse");
        assert_eq!(details.brand, None);
    }

    #[test]
    fn rejects_unusable_descriptions() {
        let err = parse_details("<product><specs><cpu>x</cpu>").expect_err("not well formed");
        assert!(!err.is_empty());

        let err = parse_details("<item/>").expect_err("wrong root");
        assert!(err.contains("<product>"), "{err}");

        let err = parse_details("<product><brand>XYZ</brand></product>").expect_err("no specs");
        assert!(err.contains("specs"), "{err}");

        let err = parse_details(
            "<product><specs><cpu>x</cpu><ram> </ram><storage>y</storage></specs></product>",
        )
        .expect_err("blank ram");
        assert!(err.contains("ram"), "{err}");
    }

    #[test]
    fn lists_fixture_products() {
        let conn = test_db();
        let products = list_products(&conn).expect("should list");
        assert_eq!(products.len(), 2);

        assert_eq!(products[0].name, "Laptop");
        assert_eq!(products[0].cpu, "Intel i7");
        assert_eq!(products[0].storage, "512GB SSD");
        assert_eq!(products[1].name, "Smartphone");
        assert_eq!(products[1].brand.as_deref(), Some("ABC"));
        assert_eq!(products[1].ram, "8GB");
    }

    #[test]
    fn insert_rejects_malformed_xml() {
        let conn = test_db();
        let err = insert_product(
            &conn,
            &Product {
                product_id: 3,
                name: "Tablet".to_string(),
                details_xml: "<product><specs>".to_string(),
            },
        )
        .expect_err("malformed xml");
        assert!(matches!(err, DbError::MalformedXml { entity: "product", .. }));
        assert_eq!(list_products(&conn).expect("should list").len(), 2);
    }

    #[test]
    fn corrupted_row_surfaces_as_malformed() {
        let conn = test_db();
        conn.execute(
            "UPDATE products SET details_xml = '<product/>' WHERE product_id = 2",
            [],
        )
        .expect("should corrupt");

        let err = list_products(&conn).expect_err("row no longer parses");
        assert!(matches!(err, DbError::MalformedXml { ref key, .. } if key == "2"));
    }
}
