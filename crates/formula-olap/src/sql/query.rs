use super::{Column, Dialect, Predicate};

/// A single `select ... from ... where ... group by ... having ... order by` statement.
///
/// Every query the native layer builds groups by its select list, so each result row is a
/// distinct key combination.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlQuery {
    dialect: Dialect,
    select: Vec<Column>,
    from: Vec<String>,
    where_clause: Vec<Predicate>,
    group_by: Vec<Column>,
    having: Vec<Predicate>,
    order_by: Vec<Column>,
}

impl SqlQuery {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            select: Vec::new(),
            from: Vec::new(),
            where_clause: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Select a key column; it is also grouped and ordered on.
    pub fn add_key_column(&mut self, column: Column) {
        if self.select.contains(&column) {
            return;
        }
        self.add_from(&column.table);
        self.group_by.push(column.clone());
        self.order_by.push(column.clone());
        self.select.push(column);
    }

    /// Add a table to the `from` list. Returns false if it was already there.
    pub fn add_from(&mut self, table: &str) -> bool {
        if self.from.iter().any(|t| t == table) {
            return false;
        }
        self.from.push(table.to_string());
        true
    }

    pub fn has_from(&self, table: &str) -> bool {
        self.from.iter().any(|t| t == table)
    }

    pub fn add_where(&mut self, predicate: Predicate) {
        if predicate != Predicate::True && !self.where_clause.contains(&predicate) {
            self.where_clause.push(predicate);
        }
    }

    pub fn add_having(&mut self, predicate: Predicate) {
        if predicate != Predicate::True && !self.having.contains(&predicate) {
            self.having.push(predicate);
        }
    }

    pub fn select(&self) -> &[Column] {
        &self.select
    }

    pub fn from(&self) -> &[String] {
        &self.from
    }

    pub fn where_clause(&self) -> &[Predicate] {
        &self.where_clause
    }

    pub fn group_by(&self) -> &[Column] {
        &self.group_by
    }

    pub fn having(&self) -> &[Predicate] {
        &self.having
    }

    pub fn order_by(&self) -> &[Column] {
        &self.order_by
    }

    pub fn to_sql(&self) -> String {
        let d = self.dialect;
        let mut sql = String::from("select ");
        if self.select.is_empty() {
            sql.push_str("1 as ");
            sql.push_str(&d.quote_identifier("c0"));
        } else {
            let cols: Vec<String> = self
                .select
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} as {}", c.render(d), d.quote_identifier(&format!("c{i}"))))
                .collect();
            sql.push_str(&cols.join(", "));
        }

        let from: Vec<String> = self
            .from
            .iter()
            .map(|t| format!("{} as {}", d.quote_identifier(t), d.quote_identifier(t)))
            .collect();
        sql.push_str(" from ");
        sql.push_str(&from.join(", "));

        if !self.where_clause.is_empty() {
            let parts: Vec<String> = self.where_clause.iter().map(|p| p.render(d)).collect();
            sql.push_str(" where ");
            sql.push_str(&parts.join(" and "));
        }
        if !self.group_by.is_empty() {
            let parts: Vec<String> = self.group_by.iter().map(|c| c.render(d)).collect();
            sql.push_str(" group by ");
            sql.push_str(&parts.join(", "));
        }
        if !self.having.is_empty() {
            let parts: Vec<String> = self.having.iter().map(|p| p.render(d)).collect();
            sql.push_str(" having ");
            sql.push_str(&parts.join(" and "));
        }
        if !self.order_by.is_empty() {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|c| d.order_by_nulls_last(&c.render(d)))
                .collect();
            sql.push_str(" order by ");
            sql.push_str(&parts.join(", "));
        }
        sql
    }
}
