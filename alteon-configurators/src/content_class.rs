//! Layer 7 content classes and their host name match entries.

use alteon_reconcile::{CollectionSpec, FieldSpec, FieldType, ObjectCatalog};

use crate::table::{ChildTable, Column, Indicator, TableLayout};

const CONTENT_CLASS_TABLE: &str = "l7ContentClass";
const HOST_NAME_TABLE: &str = "l7ContentClassHostName";

const HOST_NAME_FIELDS: &[FieldSpec] = &[
    FieldSpec::mutable("host_name", FieldType::Text),
    FieldSpec::mutable(
        "match_type",
        FieldType::Choice {
            values: &["sufx", "prefx", "equal", "include", "regex"],
            read_only_values: &["unsupported"],
        },
    ),
    FieldSpec::mutable("data_class_id", FieldType::Text),
];

const HOST_NAME_COLUMNS: &[Column] = &[
    Column {
        field: "host_name",
        column: "Hostname",
    },
    Column {
        field: "match_type",
        column: "MatchType",
    },
    Column {
        field: "data_class_id",
        column: "DataClassId",
    },
];

pub static CONTENT_CLASS: ObjectCatalog = ObjectCatalog {
    object_type: "l7_content_class",
    keys: &["content_class_id"],
    fields: &[
        FieldSpec::mutable("name", FieldType::Text),
        FieldSpec::mutable(
            "content_class_type",
            FieldType::Choice {
                values: &["http", "http2", "ssl"],
                read_only_values: &[],
            },
        )
        .create_only(),
        FieldSpec::mutable("logical_expression", FieldType::Text),
        FieldSpec::read_only("host_name", FieldType::Flag),
        FieldSpec::read_only("path", FieldType::Flag),
        FieldSpec::read_only("file_name", FieldType::Flag),
        FieldSpec::read_only("file_type", FieldType::Flag),
        FieldSpec::read_only("header", FieldType::Flag),
        FieldSpec::read_only("cookie", FieldType::Flag),
        FieldSpec::read_only("text", FieldType::Flag),
        FieldSpec::read_only("xml_tag", FieldType::Flag),
    ],
    collections: &[CollectionSpec {
        name: "host_names",
        index: "host_name_id",
        fields: HOST_NAME_FIELDS,
    }],
};

pub static CONTENT_CLASS_LAYOUT: TableLayout = TableLayout {
    catalog: &CONTENT_CLASS,
    table: CONTENT_CLASS_TABLE,
    columns: &[
        Column {
            field: "name",
            column: "Name",
        },
        Column {
            field: "content_class_type",
            column: "Type",
        },
        Column {
            field: "logical_expression",
            column: "LogicalExpression",
        },
    ],
    children: &[ChildTable {
        collection: "host_names",
        table: HOST_NAME_TABLE,
        columns: HOST_NAME_COLUMNS,
    }],
    indicators: &[
        Indicator {
            field: "host_name",
            table: HOST_NAME_TABLE,
        },
        Indicator {
            field: "path",
            table: "l7ContentClassPath",
        },
        Indicator {
            field: "file_name",
            table: "l7ContentClassFileName",
        },
        Indicator {
            field: "file_type",
            table: "l7ContentClassFileType",
        },
        Indicator {
            field: "header",
            table: "l7ContentClassHeader",
        },
        Indicator {
            field: "cookie",
            table: "l7ContentClassCookie",
        },
        Indicator {
            field: "text",
            table: "l7ContentClassText",
        },
        Indicator {
            field: "xml_tag",
            table: "l7ContentClassXmlTag",
        },
    ],
    parent: None,
};

/// A single host name entry, addressed on its own.
pub static HOST_NAME: ObjectCatalog = ObjectCatalog {
    object_type: "l7_content_class_hostname",
    keys: &["content_class_id", "host_name_id"],
    fields: HOST_NAME_FIELDS,
    collections: &[],
};

pub static HOST_NAME_LAYOUT: TableLayout = TableLayout {
    catalog: &HOST_NAME,
    table: HOST_NAME_TABLE,
    columns: HOST_NAME_COLUMNS,
    children: &[],
    indicators: &[],
    parent: Some(CONTENT_CLASS_TABLE),
};
