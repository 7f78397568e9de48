//! Documents the syntax for templates.
//!
//! <details><summary><strong style="cursor: pointer">Table of Contents</strong></summary>
//!
//! - [Synopsis](#synopsis)
//! - [Variables](#variables)
//!   - [Lookups](#lookups)
//!   - [Filters](#filters)
//!   - [Escaping](#escaping)
//! - [Tags](#tags)
//!   - [`{% if %}`](#-if-)
//!   - [`{% for %}`](#-for-)
//!   - [`{% cycle %}`](#-cycle-)
//!   - [`{% ifchanged %}`](#-ifchanged-)
//!   - [`{% extends %}` and `{% block %}`](#-extends--and--block-)
//!   - [`{% include %}` and `{% ssi %}`](#-include--and--ssi-)
//!   - [`{% with %}`](#-with-)
//!   - [`{% load %}`](#-load-)
//!   - [Other Tags](#other-tags)
//!
//! </details>
//!
//! # Synopsis
//!
//! A template is a text file with three kinds of markup.  `{{ ... }}` prints
//! a variable, `{% ... %}` is a tag that controls the logic of the template
//! and `{# ... #}` is a comment.  Everything else is copied to the output
//! unchanged, including whitespace and newlines.
//!
//! ```django
//! <title>{% block title %}My Website{% endblock %}</title>
//! <ul>
//! {% for item in navigation %}
//!   <li><a href="{{ item.href }}">{{ item.caption|title }}</a></li>
//! {% endfor %}
//! </ul>
//! {# a comment #}
//! ```
//!
//! Markup must be closed before the next markup starts.  A `{{`, `{%` or
//! `{#` without a closing delimiter fails compilation.
//!
//! # Variables
//!
//! ## Lookups
//!
//! A variable is a dotted path.  The first segment is looked up in the
//! context, innermost scope first.  Each further segment is tried as a map
//! key, as a sequence index, as a property and finally as a method without
//! arguments.  If any step fails the result is undefined, which prints as an
//! empty string and is false in conditions:
//!
//! ```django
//! {{ user.name }} {{ user.groups.0 }} {{ items.size }} {{ title.upper }}
//! ```
//!
//! Strings support the properties `capitalize`, `isalnum`, `isalpha`,
//! `isdigit`, `islower`, `isspace`, `istitle`, `isupper`, `lower`,
//! `splitlines`, `strip`, `swapcase`, `title` and `upper`.  Sequences have
//! `size` and `count`; maps additionally have `items`, `keys` and `values`.
//!
//! Attributes must not start with an underscore.  String literals in single
//! or double quotes and numbers are allowed wherever a variable is.
//!
//! ## Filters
//!
//! Filters transform a value and are separated with a pipe.  A filter can
//! take a single argument after a colon:
//!
//! ```django
//! {{ name|default:"anonymous"|lower }}
//! {{ items|join:", " }}
//! ```
//!
//! For the list of builtin filters see the [`filters`](crate::filters)
//! module.
//!
//! ## Escaping
//!
//! Autoescaping is on by default (see
//! [`Environment::set_autoescape_default`](crate::Environment::set_autoescape_default)).
//! Printed strings are HTML escaped unless they are marked safe.  String
//! literals in templates are always safe.  The `safe` filter marks a value
//! as safe, `escape` forces escaping even when autoescaping is off.
//!
//! # Tags
//!
//! ## `{% if %}`
//!
//! ```django
//! {% if user.is_admin and not user.disabled %}
//!   admin
//! {% elif user.groups and "staff" in user.groups %}
//!   staff
//! {% else %}
//!   guest
//! {% endif %}
//! ```
//!
//! Operators from lowest to highest precedence: `or`, `and`, `not` and the
//! comparisons `==`, `!=`, `<`, `>`, `<=`, `>=`, `in`, `not in`.  Ordering
//! comparisons with an undefined or none side are false.  Errors while
//! evaluating an operand make it false.
//!
//! `{% ifequal a b %}` and `{% ifnotequal a b %}` are shortcuts for the
//! equality comparisons and may have an `{% else %}` branch.
//!
//! ## `{% for %}`
//!
//! ```django
//! {% for key, value in data.items reversed %}
//!   {{ forloop.counter }}: {{ key }} = {{ value }}
//! {% empty %}
//!   nothing
//! {% endfor %}
//! ```
//!
//! Inside the loop `forloop` has the attributes `counter` (1-based),
//! `counter0`, `revcounter`, `revcounter0`, `first`, `last` and
//! `parentloop`.  Iterating a map yields `[key, value]` pairs.  With more
//! than one target variable every item is unpacked.  The `empty` branch is
//! rendered if the sequence has no items.  Loop variables are not visible
//! after the loop.
//!
//! ## `{% cycle %}`
//!
//! Produces the next of its values each time it renders:
//!
//! ```django
//! {% for row in rows %}<tr class="{% cycle 'odd' 'even' %}">{% endfor %}
//! ```
//!
//! The values can also be separated by commas.  `{% cycle a b as name %}`
//! stores the current value as `name` and a later `{% cycle name %}`
//! advances that same cycle.  The position is kept in the render context so
//! it continues across renders with the same [`Context`](crate::Context).
//!
//! ## `{% ifchanged %}`
//!
//! Renders its body only if it differs from the last time it rendered in
//! the current loop.  With arguments the arguments are compared instead of
//! the body:
//!
//! ```django
//! {% for day in days %}
//!   {% ifchanged day.month %}<h2>{{ day.month }}</h2>{% endifchanged %}
//! {% endfor %}
//! ```
//!
//! ## `{% extends %}` and `{% block %}`
//!
//! A template that extends another one only provides block overrides.  The
//! `extends` tag must come before any other tag:
//!
//! ```django
//! {% extends "base.html" %}
//! {% block title %}Index - {{ block.super }}{% endblock %}
//! ```
//!
//! `{{ block.super }}` renders the content the block has in the parent.
//! Block names must be unique within a template.  `{% endblock name %}` may
//! repeat the name of the block.  The argument of `extends` can also be a
//! variable holding a template name or a [`Value`](crate::Value) created with
//! [`Value::from_template`](crate::Value::from_template).
//!
//! ## `{% include %}` and `{% ssi %}`
//!
//! `{% include "header.html" %}` renders another template with the current
//! context.  A template that cannot be found renders nothing.
//!
//! `{% ssi "notes.txt" %}` writes the source of a template verbatim,
//! `{% ssi "notes.txt" parsed %}` renders it.
//!
//! ## `{% with %}`
//!
//! ```django
//! {% with user.profile.name as name %}{{ name }}{% endwith %}
//! {% with a=1 b=user.name %}{{ a }} {{ b }}{% endwith %}
//! ```
//!
//! ## `{% load %}`
//!
//! `{% load mutabletags %}` makes the tags and filters of a library that is
//! not opened by default available in the rest of the template.
//!
//! ## Other Tags
//!
//! - `{% autoescape on|off %} ... {% endautoescape %}` changes autoescaping.
//! - `{% filter lower|cut:" " %} ... {% endfilter %}` applies filters to its
//!   body.
//! - `{% spaceless %} ... {% endspaceless %}` removes whitespace between
//!   HTML tags.
//! - `{% comment %} ... {% endcomment %}` discards its body.
//! - `{% firstof a b "default" %}` prints the first true value.
//! - `{% templatetag openblock %}` prints template delimiters.
//! - `{% widthratio value max 100 %}` scales a value.
//! - `{% range 1 10 2 as i %} ... {% endrange %}` loops over numbers.
//! - `{% regroup people by gender as groups %}` groups consecutive items.
//! - `{% debug %}` dumps the context.
//! - `{% raw %} ... {% endraw %}` and `{% repeater %} ... {% endrepeater %}`
//!   (from `mutabletags`) keep their body live in a
//!   [`MutableTemplate`](crate::MutableTemplate).
